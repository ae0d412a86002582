use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use anyhow::Error;
use log::debug;
use opencv::core::Mat;
use uuid::Uuid;

#[derive(Default)]
struct Slots {
    images: HashMap<Uuid, Mat>,
    order: VecDeque<Uuid>,
}

/// Keeps the last decoded image of each upload session for the transform endpoint.
///
/// Holds at most `capacity` sessions, the oldest session is evicted first.
pub struct SessionStore {
    capacity: usize,
    slots: Mutex<Slots>,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        SessionStore {
            capacity: capacity.max(1),
            slots: Mutex::new(Slots::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// insert stores `img` under a new session id.
    pub fn insert(&self, img: Mat) -> Uuid {
        let id = Uuid::new_v4();
        let mut slots = self.lock();
        while slots.order.len() >= self.capacity {
            if let Some(evicted) = slots.order.pop_front() {
                slots.images.remove(&evicted);
                debug!("evicted session {evicted}");
            }
        }
        slots.images.insert(id, img);
        slots.order.push_back(id);
        id
    }

    /// get returns a copy of the image cached for `id`.
    pub fn get(&self, id: &Uuid) -> Result<Option<Mat>, Error> {
        let slots = self.lock();
        match slots.images.get(id) {
            Some(img) => Ok(Some(img.try_clone()?)),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
