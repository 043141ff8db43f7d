//! Charger status codes
//!
//! The `st` field of a status reply is an index into a fixed, ordered list
//! of states. Codes outside the list are reported as unknown rather than
//! mapped to a fallback.

/// Charger state, in wire order (the discriminant is the status code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargerStatus {
    Ready = 0,
    Charging = 1,
    ConnectedWaitingCar = 2,
    ConnectedWaitingSchedule = 3,
    Paused = 4,
    ScheduleEnd = 5,
    Locked = 6,
    Error = 7,
    ConnectedWaitingCurrentAssignation = 8,
    UnconfiguredPowerSharing = 9,
    QueuedByPowerBoost = 10,
    Discharging = 11,
    ConnectedWaitingAdminAuthForMid = 12,
    ConnectedMidSafetyMarginExceeded = 13,
    OcppUnavailable = 14,
    OcppChargeFinishing = 15,
    OcppReserved = 16,
    Updating = 17,
    QueuedByEcoSmart = 18,
}

impl ChargerStatus {
    /// All states, indexed by status code
    pub const ALL: [ChargerStatus; 19] = [
        ChargerStatus::Ready,
        ChargerStatus::Charging,
        ChargerStatus::ConnectedWaitingCar,
        ChargerStatus::ConnectedWaitingSchedule,
        ChargerStatus::Paused,
        ChargerStatus::ScheduleEnd,
        ChargerStatus::Locked,
        ChargerStatus::Error,
        ChargerStatus::ConnectedWaitingCurrentAssignation,
        ChargerStatus::UnconfiguredPowerSharing,
        ChargerStatus::QueuedByPowerBoost,
        ChargerStatus::Discharging,
        ChargerStatus::ConnectedWaitingAdminAuthForMid,
        ChargerStatus::ConnectedMidSafetyMarginExceeded,
        ChargerStatus::OcppUnavailable,
        ChargerStatus::OcppChargeFinishing,
        ChargerStatus::OcppReserved,
        ChargerStatus::Updating,
        ChargerStatus::QueuedByEcoSmart,
    ];

    /// Positional lookup; `None` for codes outside the table
    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i))
            .copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            ChargerStatus::Ready => "ready",
            ChargerStatus::Charging => "charging",
            ChargerStatus::ConnectedWaitingCar => "connected, waiting for car",
            ChargerStatus::ConnectedWaitingSchedule => "connected, waiting for schedule",
            ChargerStatus::Paused => "paused",
            ChargerStatus::ScheduleEnd => "schedule end",
            ChargerStatus::Locked => "locked",
            ChargerStatus::Error => "error",
            ChargerStatus::ConnectedWaitingCurrentAssignation => {
                "connected, waiting for current assignation"
            }
            ChargerStatus::UnconfiguredPowerSharing => "unconfigured power sharing",
            ChargerStatus::QueuedByPowerBoost => "queued by power boost",
            ChargerStatus::Discharging => "discharging",
            ChargerStatus::ConnectedWaitingAdminAuthForMid => {
                "connected, waiting for admin auth for MID"
            }
            ChargerStatus::ConnectedMidSafetyMarginExceeded => {
                "connected, MID safety margin exceeded"
            }
            ChargerStatus::OcppUnavailable => "OCPP unavailable",
            ChargerStatus::OcppChargeFinishing => "OCPP charge finishing",
            ChargerStatus::OcppReserved => "OCPP reserved",
            ChargerStatus::Updating => "updating",
            ChargerStatus::QueuedByEcoSmart => "queued by eco-smart",
        }
    }
}

impl std::fmt::Display for ChargerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::ChargerStatus;

    #[test]
    fn positional_lookup() {
        for (i, status) in ChargerStatus::ALL.iter().enumerate() {
            assert_eq!(status.code() as usize, i);
            assert_eq!(ChargerStatus::from_code(i as i64), Some(*status));
        }
        assert_eq!(ChargerStatus::from_code(1), Some(ChargerStatus::Charging));
        assert_eq!(ChargerStatus::from_code(6), Some(ChargerStatus::Locked));
        assert_eq!(ChargerStatus::from_code(18), Some(ChargerStatus::QueuedByEcoSmart));
    }

    #[test]
    fn out_of_range() {
        assert_eq!(ChargerStatus::from_code(19), None);
        assert_eq!(ChargerStatus::from_code(-1), None);
        assert_eq!(ChargerStatus::from_code(i64::MAX), None);
    }
}
