use crate::cli::actions::Action;
use anyhow::Result;
use std::path::PathBuf;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let defenses = matches
        .get_one::<String>("defenses")
        .map(String::as_str)
        .unwrap_or("all")
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid --defenses: {err}"))?;

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        defenses,
        config: matches.get_one::<String>("config").map(PathBuf::from),
        users: matches.get_one::<String>("users").map(PathBuf::from),
        alarm_log: matches.get_one::<String>("alarm-log").map(PathBuf::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cli::commands, defense::DefenseSet};

    #[test]
    fn test_handler_builds_server_action() {
        let matches = commands::new().get_matches_from(vec![
            "vigil",
            "--port",
            "9090",
            "--defenses",
            "lockout,anomaly",
            "--alarm-log",
            "/var/log/vigil/alarms.jsonl",
        ]);

        let Action::Server {
            port,
            defenses,
            config,
            users,
            alarm_log,
        } = handler(&matches).unwrap();

        assert_eq!(port, 9090);
        assert_eq!(
            defenses,
            DefenseSet {
                lockout: true,
                anomaly: true,
                ..DefenseSet::none()
            }
        );
        assert!(config.is_none());
        assert!(users.is_none());
        assert_eq!(
            alarm_log,
            Some(PathBuf::from("/var/log/vigil/alarms.jsonl"))
        );
    }
}
