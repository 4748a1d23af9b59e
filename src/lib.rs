//! Batch unconsumed news store items into one CiviCRM mailing, send it and
//! mark the items consumed.

pub mod civicrm;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod renderer;
pub mod sender;
pub mod services;

pub use dispatch::{DispatchReport, DispatchSettings, DispatchWorkflow};
pub use error::{DispatchError, PartialConsumptionError};
