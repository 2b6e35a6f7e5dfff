mod bootstrap;
mod commands;
mod loop_runner;
mod session;
mod sim_world;

pub(crate) use bootstrap::{build_app, parse_args, usage_text, CliAction};
pub(crate) use loop_runner::run;
