//! The six pipeline stages and the worker pool that drives them.
//!
//! ```text
//! device -> ingestor -+-> DecoderIn -> decoder -+
//!                     |                         v
//!                     +---------------------> ValidatorIn -> validator -> ValidatorOut
//!
//! ValidatorOut -> accumulator
//! ValidatorOut -> eventer -> EventerOut -> alerter
//! ```
//!
//! Stages never call each other; they only share topics.

pub mod accumulator;
pub mod alerter;
pub mod config;
pub mod decoder;
pub mod eventer;
pub mod ingestor;
pub mod metrics;
pub mod notify;
pub mod rule_expr;
pub mod template;
pub mod validator;
pub mod worker;

use std::sync::Arc;

use sensa_store::{
    AlarmLister, AlertWriter, Cache, DeviceReader, EventWriter, OrgReader, PointWriter,
    RuleLister, UserLister,
};

pub use accumulator::Accumulator;
pub use alerter::{Alerter, AlerterStores};
pub use config::{Config, ConfigError};
pub use decoder::DecoderStage;
pub use eventer::Eventer;
pub use ingestor::Ingestor;
pub use metrics::StageMetrics;
pub use validator::Validator;
pub use worker::{Handler, Outcome, RunningStage, StageContext};

/// Collaborators shared by the stages of one process.
#[derive(Clone)]
pub struct Backends {
    pub devices: Arc<dyn DeviceReader>,
    pub orgs: Arc<dyn OrgReader>,
    pub rules: Arc<dyn RuleLister>,
    pub alarms: Arc<dyn AlarmLister>,
    pub users: Arc<dyn UserLister>,
    pub points: Arc<dyn PointWriter>,
    pub events: Arc<dyn EventWriter>,
    pub alerts: Arc<dyn AlertWriter>,
    pub cache: Arc<dyn Cache>,
}

impl Backends {
    /// Serve every store capability from one backend.
    pub fn from_store<S>(store: S, cache: Arc<dyn Cache>) -> Self
    where
        S: DeviceReader
            + OrgReader
            + RuleLister
            + AlarmLister
            + UserLister
            + PointWriter
            + EventWriter
            + AlertWriter,
    {
        let store = Arc::new(store);
        Self {
            devices: store.clone(),
            orgs: store.clone(),
            rules: store.clone(),
            alarms: store.clone(),
            users: store.clone(),
            points: store.clone(),
            events: store.clone(),
            alerts: store,
            cache,
        }
    }

    pub fn alerter_stores(&self) -> AlerterStores {
        AlerterStores {
            orgs: self.orgs.clone(),
            alarms: self.alarms.clone(),
            users: self.users.clone(),
            alerts: self.alerts.clone(),
        }
    }
}
