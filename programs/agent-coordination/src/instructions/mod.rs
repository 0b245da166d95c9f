//! Instruction handlers for the agent coordination protocol

pub mod claim_accounts;
pub mod completion_helpers;
pub mod constants;
pub mod dispute_helpers;
pub mod lamport_transfer;
pub mod task_init_helpers;
pub mod validation;

pub mod cancel_task;
pub mod claim_task;
pub mod complete_task;
pub mod create_task;
pub mod deregister_agent;
pub mod initialize_protocol;
pub mod initiate_dispute;
pub mod register_agent;
pub mod resolve_expired_dispute;
pub mod suspend_agent;
pub mod unsuspend_agent;
pub mod update_agent;
pub mod vote_dispute;

#[allow(ambiguous_glob_reexports)]
pub use cancel_task::*;
#[allow(ambiguous_glob_reexports)]
pub use claim_task::*;
#[allow(ambiguous_glob_reexports)]
pub use complete_task::*;
#[allow(ambiguous_glob_reexports)]
pub use create_task::*;
#[allow(ambiguous_glob_reexports)]
pub use deregister_agent::*;
#[allow(ambiguous_glob_reexports)]
pub use initialize_protocol::*;
#[allow(ambiguous_glob_reexports)]
pub use initiate_dispute::*;
#[allow(ambiguous_glob_reexports)]
pub use register_agent::*;
#[allow(ambiguous_glob_reexports)]
pub use resolve_expired_dispute::*;
#[allow(ambiguous_glob_reexports)]
pub use suspend_agent::*;
#[allow(ambiguous_glob_reexports)]
pub use unsuspend_agent::*;
#[allow(ambiguous_glob_reexports)]
pub use update_agent::*;
#[allow(ambiguous_glob_reexports)]
pub use vote_dispute::*;
