pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod parsers;
pub mod services;

use std::sync::Arc;

use services::findings::FindingsSubmitter;
use services::ignore_list::IgnoreListSource;
use services::metrics::MetricsEmitter;
use services::object_store::ObjectStore;
use services::parameters::ParameterStore;
use services::results_table::ResultsTable;

/// Collaborator handles built once per process and reused by every invocation.
#[derive(Clone)]
pub struct ScanHandles {
    pub objects: Arc<dyn ObjectStore>,
    pub parameters: Arc<dyn ParameterStore>,
    pub ignore_list: Arc<dyn IgnoreListSource>,
    pub results: Arc<dyn ResultsTable>,
    pub metrics: Arc<dyn MetricsEmitter>,
    pub findings: Arc<dyn FindingsSubmitter>,
}
