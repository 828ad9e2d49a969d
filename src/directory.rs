use crate::geofence::{GeoPoint, Geofence, PolygonGeofence, RadiusGeofence};
use crate::model::{AssignationId, DriverId, JobId, TruckId, UserId, ZoneType};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Default)]
pub struct JobSites {
    pub load_sites: Vec<Arc<dyn Geofence>>,
    pub dump_sites: Vec<Arc<dyn Geofence>>,
}

impl JobSites {
    /// Site zone containing `point`. Load sites win when fences overlap.
    pub fn zone_at(&self, point: &GeoPoint) -> Option<ZoneType> {
        if self.load_sites.iter().any(|site| site.contains(point)) {
            Some(ZoneType::LoadSite)
        } else if self.dump_sites.iter().any(|site| site.contains(point)) {
            Some(ZoneType::DumpSite)
        } else {
            None
        }
    }
}

pub trait JobDirectory: Send + Sync + Debug {
    fn sites(&self, job_id: JobId) -> Option<JobSites>;

    /// User notified when the job's cycle list changes.
    fn owner(&self, job_id: JobId) -> Option<UserId>;

    fn assignation(
        &self,
        job_id: JobId,
        truck_id: TruckId,
        driver_id: DriverId,
    ) -> Option<AssignationId>;
}

#[derive(Debug, Clone, Default)]
struct JobEntry {
    owner_id: Option<UserId>,
    sites: JobSites,
    assignations: HashMap<(TruckId, DriverId), AssignationId>,
}

#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    jobs: HashMap<JobId, JobEntry>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_job(&mut self, job_id: JobId, owner_id: Option<UserId>, sites: JobSites) {
        let entry = self.jobs.entry(job_id).or_default();
        entry.owner_id = owner_id;
        entry.sites = sites;
    }

    pub fn assign(
        &mut self,
        job_id: JobId,
        truck_id: TruckId,
        driver_id: DriverId,
        assignation_id: AssignationId,
    ) {
        self.jobs
            .entry(job_id)
            .or_default()
            .assignations
            .insert((truck_id, driver_id), assignation_id);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }
}

impl JobDirectory for StaticDirectory {
    fn sites(&self, job_id: JobId) -> Option<JobSites> {
        self.jobs.get(&job_id).map(|entry| entry.sites.clone())
    }

    fn owner(&self, job_id: JobId) -> Option<UserId> {
        self.jobs.get(&job_id)?.owner_id
    }

    fn assignation(
        &self,
        job_id: JobId,
        truck_id: TruckId,
        driver_id: DriverId,
    ) -> Option<AssignationId> {
        self.jobs
            .get(&job_id)?
            .assignations
            .get(&(truck_id, driver_id))
            .copied()
    }
}

#[derive(Debug, Deserialize)]
pub struct DirectoryFile {
    pub jobs: Vec<JobFile>,
}

#[derive(Debug, Deserialize)]
pub struct JobFile {
    pub job_id: JobId,
    pub owner_id: Option<UserId>,
    #[serde(default)]
    pub load_sites: Vec<GeofenceFile>,
    #[serde(default)]
    pub dump_sites: Vec<GeofenceFile>,
    #[serde(default)]
    pub assignations: Vec<AssignationFile>,
}

#[derive(Debug, Deserialize)]
pub struct GeofenceFile {
    pub kind: String,
    pub params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct AssignationFile {
    pub assignation_id: AssignationId,
    pub truck_id: TruckId,
    pub driver_id: DriverId,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read site directory: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse site directory: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid site directory: {0}")]
    Invalid(String),
}

// Geofence factory
pub fn create_geofence(file: &GeofenceFile) -> Result<Arc<dyn Geofence>, DirectoryError> {
    match file.kind.as_str() {
        "radius" => {
            let fence: RadiusGeofence = serde_json::from_value(file.params.clone())?;
            if !fence.radius_m.is_finite() || fence.radius_m <= 0.0 {
                return Err(DirectoryError::Invalid(format!(
                    "radius must be positive, got {}",
                    fence.radius_m
                )));
            }
            Ok(Arc::new(fence))
        }
        "polygon" => {
            let fence: PolygonGeofence = serde_json::from_value(file.params.clone())?;
            if fence.vertex_count() < 3 {
                return Err(DirectoryError::Invalid(format!(
                    "polygon needs at least 3 vertices, got {}",
                    fence.vertex_count()
                )));
            }
            Ok(Arc::new(fence))
        }
        other => Err(DirectoryError::Invalid(format!(
            "unknown geofence kind: {other}"
        ))),
    }
}

pub fn build_directory(file: &DirectoryFile) -> Result<StaticDirectory, DirectoryError> {
    let mut directory = StaticDirectory::new();
    for job in &file.jobs {
        let sites = JobSites {
            load_sites: job
                .load_sites
                .iter()
                .map(create_geofence)
                .collect::<Result<_, _>>()?,
            dump_sites: job
                .dump_sites
                .iter()
                .map(create_geofence)
                .collect::<Result<_, _>>()?,
        };
        directory.insert_job(job.job_id, job.owner_id, sites);
        for assignation in &job.assignations {
            directory.assign(
                job.job_id,
                assignation.truck_id,
                assignation.driver_id,
                assignation.assignation_id,
            );
        }
    }
    Ok(directory)
}

pub fn load_directory_from_path(path: impl AsRef<Path>) -> Result<StaticDirectory, DirectoryError> {
    let contents = std::fs::read_to_string(path)?;
    let file: DirectoryFile = serde_json::from_str(&contents)?;
    build_directory(&file)
}
