//! Application orchestration module

pub mod initialization;
pub mod execution;

pub use initialization::{
    load_configuration,
    configure_logging,
    resolve_platform_kind,
    create_registry
};
pub use execution::{
    run_command,
    run_post,
    run_state_get,
    run_state_set,
    run_watch,
    WatchOptions
};
