pub mod server;

use crate::defense::DefenseSet;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        defenses: DefenseSet,
        config: Option<PathBuf>,
        users: Option<PathBuf>,
        alarm_log: Option<PathBuf>,
    },
}
