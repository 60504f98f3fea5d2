// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Phone/watch messaging actions and their wire format.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message path used for every messaging action.
pub const MESSAGING_ACTION_PATH: &str = "running_tracker/messaging_action";

/// An action exchanged between the phone and the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagingAction {
    ConnectionRequest,
    StartOrResume,
    Pause,
    Finish,
    Trackable,
    Untrackable,
    DistanceUpdate(i32),
    HeartRateUpdate(u32),
    TimeUpdate(Duration),
}

/// Delivery guarantee applied when a send is interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryClass {
    /// Live gauge values; a lost sample is superseded by the next one.
    BestEffort,
    /// Control actions; re-queued if the peer drops mid-send.
    Reliable,
}

impl MessagingAction {
    pub fn delivery_class(&self) -> DeliveryClass {
        match self {
            MessagingAction::DistanceUpdate(_)
            | MessagingAction::HeartRateUpdate(_)
            | MessagingAction::TimeUpdate(_) => DeliveryClass::BestEffort,
            _ => DeliveryClass::Reliable,
        }
    }
}

/// Tagged JSON representation of [`MessagingAction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessagingActionDto {
    ConnectionRequest,
    StartOrResume,
    Pause,
    Finish,
    Trackable,
    Untrackable,
    #[serde(rename_all = "camelCase")]
    DistanceUpdate { distance_meters: i32 },
    #[serde(rename_all = "camelCase")]
    HeartRateUpdate { heart_rate: u32 },
    #[serde(rename_all = "camelCase")]
    TimeUpdate { elapsed_millis: u64 },
}

impl From<MessagingAction> for MessagingActionDto {
    fn from(action: MessagingAction) -> Self {
        match action {
            MessagingAction::ConnectionRequest => MessagingActionDto::ConnectionRequest,
            MessagingAction::StartOrResume => MessagingActionDto::StartOrResume,
            MessagingAction::Pause => MessagingActionDto::Pause,
            MessagingAction::Finish => MessagingActionDto::Finish,
            MessagingAction::Trackable => MessagingActionDto::Trackable,
            MessagingAction::Untrackable => MessagingActionDto::Untrackable,
            MessagingAction::DistanceUpdate(distance_meters) => {
                MessagingActionDto::DistanceUpdate { distance_meters }
            }
            MessagingAction::HeartRateUpdate(heart_rate) => {
                MessagingActionDto::HeartRateUpdate { heart_rate }
            }
            MessagingAction::TimeUpdate(elapsed) => MessagingActionDto::TimeUpdate {
                elapsed_millis: elapsed.as_millis() as u64,
            },
        }
    }
}

impl From<MessagingActionDto> for MessagingAction {
    fn from(dto: MessagingActionDto) -> Self {
        match dto {
            MessagingActionDto::ConnectionRequest => MessagingAction::ConnectionRequest,
            MessagingActionDto::StartOrResume => MessagingAction::StartOrResume,
            MessagingActionDto::Pause => MessagingAction::Pause,
            MessagingActionDto::Finish => MessagingAction::Finish,
            MessagingActionDto::Trackable => MessagingAction::Trackable,
            MessagingActionDto::Untrackable => MessagingAction::Untrackable,
            MessagingActionDto::DistanceUpdate { distance_meters } => {
                MessagingAction::DistanceUpdate(distance_meters)
            }
            MessagingActionDto::HeartRateUpdate { heart_rate } => {
                MessagingAction::HeartRateUpdate(heart_rate)
            }
            MessagingActionDto::TimeUpdate { elapsed_millis } => {
                MessagingAction::TimeUpdate(Duration::from_millis(elapsed_millis))
            }
        }
    }
}

/// Encode an action as message bytes.
pub fn encode_action(action: MessagingAction) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&MessagingActionDto::from(action))
}

/// Decode message bytes; `None` for malformed or unknown payloads.
pub fn decode_action(bytes: &[u8]) -> Option<MessagingAction> {
    match serde_json::from_slice::<MessagingActionDto>(bytes) {
        Ok(dto) => Some(dto.into()),
        Err(e) => {
            tracing::debug!(error = %e, "Dropping undecodable messaging payload");
            None
        }
    }
}

/// Role of a device in the pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Phone,
    Watch,
}

impl DeviceType {
    /// Capability advertised by the *other* side that this device looks for.
    pub fn counterpart_capability(&self) -> &'static str {
        match self {
            DeviceType::Phone => "running_tracker_wear_app",
            DeviceType::Watch => "running_tracker_phone_app",
        }
    }
}

/// A discovered companion device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceNode {
    pub id: String,
    pub display_name: String,
    pub is_nearby: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_tagged() {
        let bytes = encode_action(MessagingAction::DistanceUpdate(1234)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "DistanceUpdate");
        assert_eq!(json["distanceMeters"], 1234);

        let bytes = encode_action(MessagingAction::Pause).unwrap();
        assert_eq!(bytes, br#"{"type":"Pause"}"#);
    }

    #[test]
    fn test_time_update_is_millis() {
        let bytes = encode_action(MessagingAction::TimeUpdate(Duration::from_secs(60))).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["elapsedMillis"], 60_000);
    }

    #[test]
    fn test_decode_known_payloads() {
        assert_eq!(
            decode_action(br#"{"type":"HeartRateUpdate","heartRate":140}"#),
            Some(MessagingAction::HeartRateUpdate(140))
        );
        assert_eq!(
            decode_action(br#"{"type":"ConnectionRequest"}"#),
            Some(MessagingAction::ConnectionRequest)
        );
    }

    #[test]
    fn test_decode_drops_garbage() {
        assert_eq!(decode_action(b"not json"), None);
        assert_eq!(decode_action(br#"{"type":"SelfDestruct"}"#), None);
        assert_eq!(decode_action(br#"{"type":"DistanceUpdate"}"#), None);
    }

    #[test]
    fn test_delivery_classes() {
        assert_eq!(
            MessagingAction::HeartRateUpdate(120).delivery_class(),
            DeliveryClass::BestEffort
        );
        assert_eq!(MessagingAction::Finish.delivery_class(), DeliveryClass::Reliable);
        assert_eq!(
            MessagingAction::StartOrResume.delivery_class(),
            DeliveryClass::Reliable
        );
    }
}
