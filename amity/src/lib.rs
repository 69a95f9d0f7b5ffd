pub mod commands;
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use commands::{CLAP_STYLING, command_argument_builder};
pub use handlers::{
    data_dir_from_args, init_tracing, pipeline_options_from_args, report_run,
    resolve_cookie_file, scroll_options_from_args,
};
