use std::sync::Arc;

use async_trait::async_trait;
use smartnode_common::{ClimateAction, ClimateState, ModeError, MODE_OFF};

use super::Mode;
use crate::capability::HeatingUnit;

/// Keeps the heating unit switched off.
pub struct Off {
    heater: Arc<dyn HeatingUnit>,
}

pub(super) fn build(heater: Arc<dyn HeatingUnit>) -> Box<dyn Mode> {
    Box::new(Off { heater })
}

#[async_trait]
impl Mode for Off {
    fn identity(&self) -> &str {
        MODE_OFF
    }

    async fn trigger(
        &self,
        state: &mut ClimateState,
        _current_temp: Option<f32>,
    ) -> Result<(), ModeError> {
        if self.heater.is_on() {
            self.heater.turn_off().await?;
        }
        state.current_action = ClimateAction::Off;
        Ok(())
    }

    async fn activate(&self, state: &mut ClimateState) -> Result<bool, ModeError> {
        self.heater.turn_off().await?;
        state.current_action = ClimateAction::Off;
        Ok(true)
    }

    async fn deactivate(&self, _state: &mut ClimateState) -> Result<bool, ModeError> {
        Ok(true)
    }
}
