pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod graph;
pub mod health;
pub mod models;
pub mod operations;
pub mod profile;
pub mod security;

pub mod prelude {
    pub use crate::config::{Config, KafkaConfig, Topics};
    pub use crate::consumer::{parse_event, BrokerStatus, EventConsumer};
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::graph::GraphClient;
    pub use crate::models::{
        EventKind, EventMessage, GroupEvent, GroupId, LegacyGroupId, LegacyMemberId, MemberRef,
        MembershipType,
    };
    pub use crate::operations::SyncOperations;
    pub use crate::profile::ProfileClient;
}
