use crate::error::SimError;
use crate::types::{Body, BodyHandle, RenderInstance};

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    body: Option<Body>,
}

/// Arena of bodies addressed by generation-checked handles.
/// Removing a body frees its slot for reuse without invalidating any other
/// live handle.
#[derive(Debug, Clone, Default)]
pub struct BodyStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl BodyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, body: Body) -> BodyHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.body = Some(body);
            return BodyHandle::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            body: Some(body),
        });
        BodyHandle::new(index, 0)
    }

    pub fn get(&self, handle: BodyHandle) -> Option<&Body> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.body.as_ref())
    }

    pub fn get_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.body.as_mut())
    }

    pub fn try_get_mut(&mut self, handle: BodyHandle) -> Result<&mut Body, SimError> {
        self.get_mut(handle).ok_or(SimError::StaleHandle(handle))
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Remove a body. Returns None if the handle is stale.
    pub fn remove(&mut self, handle: BodyHandle) -> Option<Body> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        let body = slot.body.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index() as u32);
        self.len -= 1;
        Some(body)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live bodies in slot order
    pub fn iter(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.body
                .as_ref()
                .map(|body| (BodyHandle::new(i as u32, slot.generation), body))
        })
    }

    /// Active body identities in slot order
    pub fn handles(&self) -> Vec<BodyHandle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    pub fn total_mass(&self) -> f64 {
        self.iter().map(|(_, body)| body.mass as f64).sum()
    }

    pub fn render_instances(&self) -> Vec<RenderInstance> {
        self.iter().map(|(_, body)| body.render_instance()).collect()
    }
}

impl FromIterator<Body> for BodyStore {
    fn from_iter<I: IntoIterator<Item = Body>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut store = BodyStore::with_capacity(iter.size_hint().0);
        for body in iter {
            store.insert(body);
        }
        store
    }
}
