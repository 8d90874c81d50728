use serde::{Deserialize, Serialize};

use crate::{
    config::ClimateConfig,
    types::{ClimateAction, MODE_OFF},
};

/// Climate controller state, mirrored to the retained `state` topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateState {
    #[serde(rename = "temp_high")]
    pub current_temp_high: f32,
    #[serde(rename = "temp_low")]
    pub current_temp_low: f32,
    #[serde(rename = "away", serialize_with = "on_off::serialize")]
    pub away_active: bool,
    pub storage_temp_high: f32,
    pub storage_temp_low: f32,
    pub storage_away_temp_high: f32,
    pub storage_away_temp_low: f32,
    #[serde(rename = "mode")]
    pub current_mode: String,
    #[serde(rename = "action")]
    pub current_action: ClimateAction,
}

/// A retained state message as read back from the broker. Every field is
/// optional so that older or partial snapshots merge onto the defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default, rename = "temp_high")]
    pub current_temp_high: Option<f32>,
    #[serde(default, rename = "temp_low")]
    pub current_temp_low: Option<f32>,
    #[serde(default, rename = "away", deserialize_with = "on_off::deserialize_option")]
    pub away_active: Option<bool>,
    #[serde(default)]
    pub storage_temp_high: Option<f32>,
    #[serde(default)]
    pub storage_temp_low: Option<f32>,
    #[serde(default)]
    pub storage_away_temp_high: Option<f32>,
    #[serde(default)]
    pub storage_away_temp_low: Option<f32>,
}

impl StateSnapshot {
    pub fn parse(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

impl ClimateState {
    pub fn new(config: &ClimateConfig) -> Self {
        let mut state = Self {
            current_temp_high: config.temp_high,
            current_temp_low: config.temp_low,
            away_active: false,
            storage_temp_high: config.temp_high,
            storage_temp_low: config.temp_low,
            storage_away_temp_high: config.away_temp_high,
            storage_away_temp_low: config.away_temp_low,
            current_mode: MODE_OFF.to_string(),
            current_action: ClimateAction::Off,
        };
        state.sanitize(config.min_temp, config.max_temp);
        state
    }

    /// Clamps every setpoint into `[min, max]` and keeps each low value at or
    /// below its high partner.
    pub fn sanitize(&mut self, min: f32, max: f32) {
        let clamp = |value: f32| {
            if value.is_finite() {
                value.clamp(min, max)
            } else {
                min
            }
        };
        self.current_temp_high = clamp(self.current_temp_high);
        self.current_temp_low = clamp(self.current_temp_low).min(self.current_temp_high);
        self.storage_temp_high = clamp(self.storage_temp_high);
        self.storage_temp_low = clamp(self.storage_temp_low).min(self.storage_temp_high);
        self.storage_away_temp_high = clamp(self.storage_away_temp_high);
        self.storage_away_temp_low =
            clamp(self.storage_away_temp_low).min(self.storage_away_temp_high);
    }

    pub fn set_temp_high(&mut self, value: f32) {
        self.current_temp_high = value;
        if self.current_temp_low > value {
            self.current_temp_low = value;
        }
        let (high, low) = self.active_storage_mut();
        *high = value;
        if *low > value {
            *low = value;
        }
    }

    pub fn set_temp_low(&mut self, value: f32) {
        self.current_temp_low = value;
        if self.current_temp_high < value {
            self.current_temp_high = value;
        }
        let (high, low) = self.active_storage_mut();
        *low = value;
        if *high < value {
            *high = value;
        }
    }

    /// Switches between the home and away profiles. Returns `false` when the
    /// requested profile is already active.
    pub fn set_away(&mut self, active: bool) -> bool {
        if self.away_active == active {
            return false;
        }
        self.away_active = active;
        if active {
            self.current_temp_high = self.storage_away_temp_high;
            self.current_temp_low = self.storage_away_temp_low;
        } else {
            self.current_temp_high = self.storage_temp_high;
            self.current_temp_low = self.storage_temp_low;
        }
        true
    }

    /// Applies a recovered snapshot and returns the mode it carried. The mode
    /// itself is not written; activating it is the controller's job.
    pub fn merge(&mut self, snapshot: StateSnapshot, min: f32, max: f32) -> Option<String> {
        let StateSnapshot {
            mode,
            current_temp_high,
            current_temp_low,
            away_active,
            storage_temp_high,
            storage_temp_low,
            storage_away_temp_high,
            storage_away_temp_low,
        } = snapshot;

        if let Some(value) = current_temp_high {
            self.current_temp_high = value;
        }
        if let Some(value) = current_temp_low {
            self.current_temp_low = value;
        }
        if let Some(value) = away_active {
            self.away_active = value;
        }
        if let Some(value) = storage_temp_high {
            self.storage_temp_high = value;
        }
        if let Some(value) = storage_temp_low {
            self.storage_temp_low = value;
        }
        if let Some(value) = storage_away_temp_high {
            self.storage_away_temp_high = value;
        }
        if let Some(value) = storage_away_temp_low {
            self.storage_away_temp_low = value;
        }
        self.sanitize(min, max);
        mode
    }

    fn active_storage_mut(&mut self) -> (&mut f32, &mut f32) {
        if self.away_active {
            (
                &mut self.storage_away_temp_high,
                &mut self.storage_away_temp_low,
            )
        } else {
            (&mut self.storage_temp_high, &mut self.storage_temp_low)
        }
    }
}

mod on_off {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "ON" } else { "OFF" })
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Token(String),
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<bool>, D::Error> {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Flag(flag)) => Ok(Some(flag)),
            Some(Raw::Token(token)) => match token.to_ascii_uppercase().as_str() {
                "ON" => Ok(Some(true)),
                "OFF" => Ok(Some(false)),
                other => Err(D::Error::custom(format!("unknown away token `{other}`"))),
            },
        }
    }
}
