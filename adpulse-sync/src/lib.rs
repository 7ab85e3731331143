pub mod orchestrator;
pub mod poller;
pub mod reconcile;
pub mod upsert;

pub use orchestrator::{
    clear_user_data, run_user_sync, spawn_user_sync, sync_all_users, ClearReport, TriggerOutcome,
};
pub use poller::run as run_poller;
pub use reconcile::{reconcile_user, ReconcileReport};
pub use upsert::SinkReport;
