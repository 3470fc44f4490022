use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn validator_defenses() -> ValueParser {
    ValueParser::from(
        move |defenses: &str| -> std::result::Result<String, String> {
            defenses
                .parse::<crate::defense::DefenseSet>()
                .map(|_| defenses.to_string())
        },
    )
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("vigil")
        .about("Adaptive login defense engine")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("VIGIL_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("defenses")
                .short('D')
                .long("defenses")
                .help("Active defenses: all, none, or a comma list of rate-limit, lockout, captcha, anomaly")
                .default_value("all")
                .env("VIGIL_DEFENSES")
                .value_parser(validator_defenses()),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to a JSON file overriding defense defaults")
                .env("VIGIL_CONFIG"),
        )
        .arg(
            Arg::new("users")
                .short('u')
                .long("users")
                .help("Path to a JSON file mapping username to password (default: built-in demo users)")
                .env("VIGIL_USERS"),
        )
        .arg(
            Arg::new("alarm-log")
                .long("alarm-log")
                .help("Append anomaly alarms as JSON lines to this file")
                .env("VIGIL_ALARM_LOG"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("VIGIL_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
