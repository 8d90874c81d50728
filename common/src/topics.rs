pub const SET_SUFFIX: &str = "/set";
pub const STATUS_ONLINE: &str = "online";
pub const STATUS_OFFLINE: &str = "offline";

pub fn device_topic(home: &str, device_id: &str, name: &str) -> String {
    format!("{home}/{device_id}/{name}")
}

pub fn availability_topic(home: &str, device_id: &str) -> String {
    format!("{home}/{device_id}/status")
}

pub fn discovery_topic(prefix: &str, component_type: &str, device_id: &str, name: &str) -> String {
    format!("{prefix}/{component_type}/{device_id}/{name}/config")
}

/// Strips the `/set` suffix of a command topic to get its state topic.
pub fn state_topic_of(command_topic: &str) -> &str {
    command_topic
        .strip_suffix(SET_SUFFIX)
        .unwrap_or(command_topic)
}

/// Commands a climate controller accepts, one topic each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClimateCommand {
    Mode,
    TempLow,
    TempHigh,
    Away,
}

impl ClimateCommand {
    pub const ALL: [Self; 4] = [Self::Mode, Self::TempLow, Self::TempHigh, Self::Away];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mode => "mode",
            Self::TempLow => "temp_low",
            Self::TempHigh => "temp_high",
            Self::Away => "away",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.as_str() == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClimateTopics {
    pub base: String,
    pub state: String,
    pub action: String,
    pub temp_low: String,
    pub temp_high: String,
    pub availability: String,
}

impl ClimateTopics {
    pub fn new(home: &str, device_id: &str, name: &str) -> Self {
        let base = device_topic(home, device_id, name);
        Self {
            state: format!("{base}/state"),
            action: format!("{base}/action"),
            temp_low: format!("{base}/temp_low"),
            temp_high: format!("{base}/temp_high"),
            availability: availability_topic(home, device_id),
            base,
        }
    }

    pub fn command(&self, command: ClimateCommand) -> String {
        format!("{}/{}{SET_SUFFIX}", self.base, command.as_str())
    }

    pub fn command_topics(&self) -> Vec<String> {
        ClimateCommand::ALL
            .into_iter()
            .map(|command| self.command(command))
            .collect()
    }

    /// Resolves an incoming topic to the command bound to it.
    pub fn command_for(&self, topic: &str) -> Option<ClimateCommand> {
        let rest = topic.strip_prefix(self.base.as_str())?.strip_prefix('/')?;
        ClimateCommand::parse(rest.strip_suffix(SET_SUFFIX)?)
    }
}
