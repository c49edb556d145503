// src/model/mod.rs

//! Data model: request contexts and persisted job/stage/task records.

pub mod command;
pub mod record;

pub use command::{
    ClusterCommand, CommandContext, ComponentHosts, HostCommand, ServiceCommand, StageContext,
    TaskContext,
};
pub use record::{
    ClusterId, ClusterRecord, ComponentRecord, HostRecord, JobId, JobRecord, JobSnapshot, Page,
    PageRequest, ServiceRecord, StageId, StageRecord, StateBatch, TaskId, TaskRecord,
};
