pub mod deadline;
pub mod fakes;
pub mod findings;
pub mod ignore_list;
pub mod metrics;
pub mod normalizer;
pub mod object_store;
pub mod parameters;
pub mod pipeline;
pub mod results_table;
