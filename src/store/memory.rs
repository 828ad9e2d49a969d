use crate::error::AppError;
use crate::model::{CycleId, CycleKey, JobId, LoadCycle, NewLoadCycle, TruckId};
use crate::store::{CycleFilter, CycleStore};
use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: CycleId,
    cycles: BTreeMap<CycleId, LoadCycle>,
    numbers: HashSet<(CycleKey, u32)>,
}

/// `set_available(false)` fails every call with [`AppError::StoreUnavailable`].
#[derive(Debug)]
pub struct MemoryCycleStore {
    inner: RwLock<MemoryInner>,
    available: AtomicBool,
}

impl MemoryCycleStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryInner::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::StoreUnavailable(
                "memory store switched off".to_string(),
            ))
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryInner>, AppError> {
        self.check_available()?;
        self.inner
            .read()
            .map_err(|_| AppError::StoreUnavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryInner>, AppError> {
        self.check_available()?;
        self.inner
            .write()
            .map_err(|_| AppError::StoreUnavailable("memory store lock poisoned".to_string()))
    }
}

impl Default for MemoryCycleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleStore for MemoryCycleStore {
    fn latest(&self, key: &CycleKey) -> Result<Option<LoadCycle>, AppError> {
        let guard = self.read()?;
        Ok(guard
            .cycles
            .values()
            .filter(|cycle| cycle.key() == *key)
            .max_by_key(|cycle| cycle.load_number)
            .cloned())
    }

    fn max_load_number(&self, job_id: JobId, truck_id: TruckId) -> Result<Option<u32>, AppError> {
        let guard = self.read()?;
        Ok(guard
            .cycles
            .values()
            .filter(|cycle| cycle.job_id == job_id && cycle.truck_id == truck_id)
            .map(|cycle| cycle.load_number)
            .max())
    }

    fn insert(&self, cycle: NewLoadCycle) -> Result<LoadCycle, AppError> {
        let mut guard = self.write()?;
        if !guard.numbers.insert((cycle.key, cycle.load_number)) {
            return Err(AppError::Conflict {
                job_id: cycle.key.job_id,
                truck_id: cycle.key.truck_id,
                assignation_id: cycle.key.assignation_id,
                load_number: cycle.load_number,
            });
        }

        guard.next_id += 1;
        let stored = LoadCycle {
            id: guard.next_id,
            job_id: cycle.key.job_id,
            truck_id: cycle.key.truck_id,
            assignation_id: cycle.key.assignation_id,
            load_number: cycle.load_number,
            load: cycle.load,
            dump: cycle.dump,
            load_arrival: cycle.load_arrival,
            load_leave: cycle.load_leave,
            dump_arrival: cycle.dump_arrival,
            dump_leave: cycle.dump_leave,
            ticket: cycle.ticket,
            tons: cycle.tons,
            driver_invoice_id: None,
        };
        guard.cycles.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn update(&self, cycle: &LoadCycle) -> Result<(), AppError> {
        let mut guard = self.write()?;
        let Some(existing) = guard.cycles.get(&cycle.id) else {
            return Err(AppError::CycleNotFound(cycle.id));
        };
        let (old_key, old_number) = (existing.key(), existing.load_number);
        let (new_key, new_number) = (cycle.key(), cycle.load_number);

        if (old_key, old_number) != (new_key, new_number) {
            if guard.numbers.contains(&(new_key, new_number)) {
                return Err(AppError::Conflict {
                    job_id: new_key.job_id,
                    truck_id: new_key.truck_id,
                    assignation_id: new_key.assignation_id,
                    load_number: new_number,
                });
            }
            guard.numbers.remove(&(old_key, old_number));
            guard.numbers.insert((new_key, new_number));
        }
        guard.cycles.insert(cycle.id, cycle.clone());
        Ok(())
    }

    fn get(&self, id: CycleId) -> Result<Option<LoadCycle>, AppError> {
        let guard = self.read()?;
        Ok(guard.cycles.get(&id).cloned())
    }

    fn list(&self, filter: &CycleFilter) -> Result<Vec<LoadCycle>, AppError> {
        let guard = self.read()?;
        let mut cycles: Vec<LoadCycle> = guard
            .cycles
            .values()
            .filter(|cycle| filter.matches(cycle))
            .cloned()
            .collect();
        cycles.sort_by_key(|cycle| (cycle.load_number, cycle.truck_id, cycle.assignation_id));
        Ok(cycles)
    }
}
