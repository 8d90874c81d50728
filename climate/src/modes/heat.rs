use std::sync::Arc;

use async_trait::async_trait;
use smartnode_common::{ClimateAction, ClimateState, ModeError, MODE_HEAT};

use super::Mode;
use crate::capability::HeatingUnit;

/// Two-point heating: on below the low setpoint, off above the high one,
/// unchanged in between.
pub struct Heat {
    heater: Arc<dyn HeatingUnit>,
}

pub(super) fn build(heater: Arc<dyn HeatingUnit>) -> Box<dyn Mode> {
    Box::new(Heat { heater })
}

impl Heat {
    fn running_action(&self) -> ClimateAction {
        if self.heater.is_on() {
            ClimateAction::Heating
        } else {
            ClimateAction::Idle
        }
    }
}

#[async_trait]
impl Mode for Heat {
    fn identity(&self) -> &str {
        MODE_HEAT
    }

    async fn trigger(
        &self,
        state: &mut ClimateState,
        current_temp: Option<f32>,
    ) -> Result<(), ModeError> {
        let Some(temp) = current_temp else {
            // Never keep heating blind.
            if self.heater.is_on() {
                self.heater.turn_off().await?;
            }
            state.current_action = ClimateAction::Idle;
            return Err(ModeError::NoTemperature);
        };

        if temp < state.current_temp_low {
            if !self.heater.is_on() {
                self.heater.turn_on().await?;
            }
        } else if temp > state.current_temp_high && self.heater.is_on() {
            self.heater.turn_off().await?;
        }
        state.current_action = self.running_action();
        Ok(())
    }

    async fn activate(&self, state: &mut ClimateState) -> Result<bool, ModeError> {
        state.current_action = self.running_action();
        Ok(true)
    }

    async fn deactivate(&self, state: &mut ClimateState) -> Result<bool, ModeError> {
        self.heater.turn_off().await?;
        state.current_action = ClimateAction::Off;
        Ok(true)
    }
}
