/// What the codec needs to know about one keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub keyword: &'static str,
    /// 1-based argument position of the body length, for keywords that
    /// carry a body.
    pub body: Option<usize>,
}

const fn plain(keyword: &'static str) -> Capability {
    Capability {
        keyword,
        body: None,
    }
}

const fn with_body(keyword: &'static str, position: usize) -> Capability {
    Capability {
        keyword,
        body: Some(position),
    }
}

/// Every keyword of the beanstalkd protocol, commands and replies.
pub static CAPABILITIES: &[Capability] = &[
    // Producer commands
    with_body("put", 4),
    plain("use"),
    // Worker commands
    plain("reserve"),
    plain("reserve-with-timeout"),
    plain("reserve-job"),
    plain("delete"),
    plain("release"),
    plain("bury"),
    plain("touch"),
    plain("watch"),
    plain("ignore"),
    // Other commands
    plain("peek"),
    plain("peek-ready"),
    plain("peek-delayed"),
    plain("peek-buried"),
    plain("kick"),
    plain("kick-job"),
    plain("stats-job"),
    plain("stats-tube"),
    plain("stats"),
    plain("list-tubes"),
    plain("list-tube-used"),
    plain("list-tubes-watched"),
    plain("pause-tube"),
    plain("quit"),
    // Replies
    plain("INSERTED"),
    plain("BURIED"),
    plain("EXPECTED_CRLF"),
    plain("JOB_TOO_BIG"),
    plain("DRAINING"),
    plain("USING"),
    plain("DEADLINE_SOON"),
    plain("TIMED_OUT"),
    with_body("RESERVED", 2),
    plain("DELETED"),
    plain("NOT_FOUND"),
    plain("RELEASED"),
    plain("TOUCHED"),
    plain("WATCHING"),
    plain("NOT_IGNORED"),
    with_body("FOUND", 2),
    plain("KICKED"),
    with_body("OK", 1),
    plain("PAUSED"),
    // Error replies
    plain("OUT_OF_MEMORY"),
    plain("INTERNAL_ERROR"),
    plain("BAD_FORMAT"),
    plain("UNKNOWN_COMMAND"),
];

pub fn lookup(keyword: &str) -> Option<&'static Capability> {
    CAPABILITIES.iter().find(|c| c.keyword == keyword)
}

/// Body length position for `keyword`. Unknown keywords carry no body.
pub fn body_position(keyword: &str) -> Option<usize> {
    lookup(keyword).and_then(|c| c.body)
}

/// Replies beanstalkd sends when it cannot process any command.
pub fn is_error_reply(keyword: &str) -> bool {
    matches!(
        keyword,
        "OUT_OF_MEMORY" | "INTERNAL_ERROR" | "BAD_FORMAT" | "UNKNOWN_COMMAND"
    )
}
