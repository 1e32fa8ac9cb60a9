use std::fmt;

use crate::{
    config::LightPolicy,
    failsafe::FailSafeCause,
    settings::RemoteSettings,
    time_of_day::{in_window, TimeOfDay},
    types::{ActuatorKind, ActuatorState, SensorSample},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchReason {
    NoSettings,
    TemperatureAboveTrigger,
    TemperatureAtOrBelowTrigger,
    NoPresence,
    InWindowWithPresence,
    InWindow,
    PresenceOutsideWindow,
    OutsideWindow,
    FailSafe(FailSafeCause),
}

impl fmt::Display for SwitchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSettings => f.write_str("no settings received yet"),
            Self::TemperatureAboveTrigger => {
                f.write_str("temperature above trigger with presence detected")
            }
            Self::TemperatureAtOrBelowTrigger => f.write_str("temperature at or below trigger"),
            Self::NoPresence => f.write_str("no presence detected"),
            Self::InWindowWithPresence => f.write_str("inside light window with presence"),
            Self::InWindow => f.write_str("inside light window"),
            Self::PresenceOutsideWindow => f.write_str("presence detected outside light window"),
            Self::OutsideWindow => f.write_str("outside light window"),
            Self::FailSafe(cause) => write!(f, "fail-safe: {cause}"),
        }
    }
}

/// Desired output levels for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decision {
    pub fan: bool,
    pub light: bool,
}

impl Decision {
    pub fn get(self, actuator: ActuatorKind) -> bool {
        match actuator {
            ActuatorKind::Fan => self.fan,
            ActuatorKind::Light => self.light,
        }
    }
}

/// A single edge on one output. Only emitted when the desired level differs
/// from the tracked one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineAction {
    pub actuator: ActuatorKind,
    pub on: bool,
    pub reason: SwitchReason,
}

impl fmt::Display for EngineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = if self.on { "ON" } else { "OFF" };
        write!(f, "{} {level}: {}", self.actuator, self.reason)
    }
}

/// Pure decision: what both outputs should be for this sample, time and
/// settings. Without settings everything stays off.
pub fn decide(
    sample: &SensorSample,
    now: TimeOfDay,
    settings: Option<&RemoteSettings>,
    policy: LightPolicy,
) -> Decision {
    Decision {
        fan: fan_rule(sample, settings).0,
        light: light_rule(sample, now, settings, policy).0,
    }
}

fn fan_rule(sample: &SensorSample, settings: Option<&RemoteSettings>) -> (bool, SwitchReason) {
    let Some(settings) = settings else {
        return (false, SwitchReason::NoSettings);
    };

    // Strictly above: a reading equal to the trigger demands off.
    if sample.temperature_c <= settings.temperature_trigger_c {
        (false, SwitchReason::TemperatureAtOrBelowTrigger)
    } else if !sample.presence {
        (false, SwitchReason::NoPresence)
    } else {
        (true, SwitchReason::TemperatureAboveTrigger)
    }
}

fn light_rule(
    sample: &SensorSample,
    now: TimeOfDay,
    settings: Option<&RemoteSettings>,
    policy: LightPolicy,
) -> (bool, SwitchReason) {
    let Some(settings) = settings else {
        return (false, SwitchReason::NoSettings);
    };

    let window = in_window(now, settings.light_on, settings.light_off);
    match policy {
        LightPolicy::PresenceInWindow => match (window, sample.presence) {
            (false, _) => (false, SwitchReason::OutsideWindow),
            (true, false) => (false, SwitchReason::NoPresence),
            (true, true) => (true, SwitchReason::InWindowWithPresence),
        },
        LightPolicy::WindowOrPresence => match (window, sample.presence) {
            (true, _) => (true, SwitchReason::InWindow),
            (false, true) => (true, SwitchReason::PresenceOutsideWindow),
            (false, false) => (false, SwitchReason::NoPresence),
        },
    }
}

/// Owns the tracked level of both outputs and turns decisions into edges.
#[derive(Debug, Clone)]
pub struct ActuationEngine {
    policy: LightPolicy,
    fan: ActuatorState,
    light: ActuatorState,
    transitions: u64,
}

impl ActuationEngine {
    pub fn new(policy: LightPolicy) -> Self {
        Self {
            policy,
            fan: ActuatorState::default(),
            light: ActuatorState::default(),
            transitions: 0,
        }
    }

    pub fn policy(&self) -> LightPolicy {
        self.policy
    }

    pub fn state(&self, actuator: ActuatorKind) -> ActuatorState {
        match actuator {
            ActuatorKind::Fan => self.fan,
            ActuatorKind::Light => self.light,
        }
    }

    pub fn is_on(&self, actuator: ActuatorKind) -> bool {
        self.state(actuator).on
    }

    pub fn any_on(&self) -> bool {
        self.fan.on || self.light.on
    }

    /// Number of edges applied since boot.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn evaluate(
        &mut self,
        sample: &SensorSample,
        now: TimeOfDay,
        settings: Option<&RemoteSettings>,
    ) -> Vec<EngineAction> {
        let mut actions = Vec::new();

        let (fan, fan_reason) = fan_rule(sample, settings);
        self.transition(ActuatorKind::Fan, fan, fan_reason, &mut actions);

        let (light, light_reason) = light_rule(sample, now, settings, self.policy);
        self.transition(ActuatorKind::Light, light, light_reason, &mut actions);

        actions
    }

    /// Drive both outputs off regardless of inputs.
    pub fn force_off(&mut self, cause: FailSafeCause) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        for actuator in ActuatorKind::ALL {
            self.transition(actuator, false, SwitchReason::FailSafe(cause), &mut actions);
        }
        actions
    }

    /// Undo an edge whose hardware write failed so the next evaluation
    /// requests it again.
    pub fn rollback(&mut self, action: &EngineAction) {
        let state = self.state_mut(action.actuator);
        if state.on == action.on {
            state.on = !action.on;
            self.transitions = self.transitions.saturating_sub(1);
        }
    }

    fn state_mut(&mut self, actuator: ActuatorKind) -> &mut ActuatorState {
        match actuator {
            ActuatorKind::Fan => &mut self.fan,
            ActuatorKind::Light => &mut self.light,
        }
    }

    fn transition(
        &mut self,
        actuator: ActuatorKind,
        desired: bool,
        reason: SwitchReason,
        actions: &mut Vec<EngineAction>,
    ) {
        let state = self.state_mut(actuator);
        if state.on == desired {
            return;
        }

        state.on = desired;
        self.transitions += 1;
        actions.push(EngineAction {
            actuator,
            on: desired,
            reason,
        });
    }
}
