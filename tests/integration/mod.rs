//! Integration tests for the tab relay

mod config_integration;
mod relay_scenarios;
mod remote_actions;
mod script_execution;
mod test_utils;
