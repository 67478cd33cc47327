//! OwnTracks payload decoding and device key resolution
//!
//! Docs on the message formats:
//! - http://owntracks.org/booklet/tech/json/#_typelocation
//! - http://owntracks.org/booklet/tech/json/#_typetransition

use crate::domain::types::{
    DeviceKey, Direction, Gps, LocationEvent, OwnTracksMessage, TransitionEvent, TransitionKind,
};
use crate::domain::PresenceError;

/// Topic tree a message arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `<ns>/<host>/<device>`
    Location,
    /// `<ns>/<host>/<device>/event`
    Event,
}

impl Route {
    /// Classify a topic by shape, `None` for anything not subscribed to
    pub fn from_topic(topic: &str) -> Option<Self> {
        let parts: Vec<&str> = topic.split('/').collect();
        match parts.as_slice() {
            [_, _, _] => Some(Self::Location),
            [_, _, _, "event"] => Some(Self::Event),
            _ => None,
        }
    }

    /// `_type` accepted on this route
    fn message_type(self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Event => "transition",
        }
    }
}

/// Result of decoding a payload
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Location(LocationEvent),
    Transition(TransitionEvent),
    /// Valid JSON that this tracker does not handle on this route
    NotApplicable,
}

/// Derive `(device_key, host_name)` from `<ns>/<host>/<device>[/event]`
pub fn resolve_device(topic: &str) -> Result<(DeviceKey, String), PresenceError> {
    let mut parts = topic.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(host), Some(device)) => {
            Ok((DeviceKey(format!("{}_{}", host, device)), host.to_string()))
        }
        _ => Err(PresenceError::InvalidTopic(topic.to_string())),
    }
}

/// Decode a raw payload received on `topic`
pub fn decode_payload(route: Route, topic: &str, payload: &[u8]) -> Result<Decoded, PresenceError> {
    let json_str = std::str::from_utf8(payload)?;
    let value: serde_json::Value = serde_json::from_str(json_str)?;

    if !value.is_object() {
        return Ok(Decoded::NotApplicable);
    }
    if value.get("_type").and_then(|t| t.as_str()) != Some(route.message_type()) {
        return Ok(Decoded::NotApplicable);
    }

    let message: OwnTracksMessage = serde_json::from_value(value)?;
    let (device, host_name) = resolve_device(topic)?;

    match route {
        Route::Location => decode_location(message, device, host_name).map(Decoded::Location),
        Route::Event => decode_transition(message, device, host_name).map(Decoded::Transition),
    }
}

fn required<T>(value: Option<T>, kind: &'static str, field: &'static str) -> Result<T, PresenceError> {
    value.ok_or(PresenceError::MissingField { kind, field })
}

fn decode_location(
    message: OwnTracksMessage,
    device: DeviceKey,
    host_name: String,
) -> Result<LocationEvent, PresenceError> {
    let lat = required(message.lat, "location", "lat")?;
    let lon = required(message.lon, "location", "lon")?;

    Ok(LocationEvent {
        device,
        host_name,
        gps: Gps::new(lat, lon),
        accuracy: message.acc,
        battery: message.batt,
    })
}

fn decode_transition(
    message: OwnTracksMessage,
    device: DeviceKey,
    host_name: String,
) -> Result<TransitionEvent, PresenceError> {
    let desc = required(message.desc, "transition", "desc")?;
    let event = required(message.event, "transition", "event")?;
    let t = required(message.t, "transition", "t")?;
    let direction: Direction = event.parse()?;

    let gps = match (message.lat, message.lon) {
        (Some(lat), Some(lon)) => Some(Gps::new(lat, lon)),
        _ => None,
    };

    Ok(TransitionEvent {
        device,
        host_name,
        desc,
        kind: TransitionKind::from_trigger(&t),
        direction,
        gps,
        accuracy: message.acc,
        battery: message.batt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCATION_TOPIC: &str = "owntracks/phone/alice";
    const EVENT_TOPIC: &str = "owntracks/phone/alice/event";

    #[test]
    fn test_route_from_topic() {
        assert_eq!(Route::from_topic(LOCATION_TOPIC), Some(Route::Location));
        assert_eq!(Route::from_topic(EVENT_TOPIC), Some(Route::Event));
        assert_eq!(Route::from_topic("owntracks/phone/alice/cmd"), None);
        assert_eq!(Route::from_topic("owntracks/phone"), None);
    }

    #[test]
    fn test_resolve_device() {
        let (key, host) = resolve_device(EVENT_TOPIC).unwrap();
        assert_eq!(key, DeviceKey::from("phone_alice"));
        assert_eq!(host, "phone");

        assert!(matches!(resolve_device("owntracks/phone"), Err(PresenceError::InvalidTopic(_))));
    }

    #[test]
    fn test_decode_location() {
        let payload = br#"{"_type":"location","lat":1.0,"lon":2.0,"acc":5,"batt":77,"tst":1}"#;
        let decoded = decode_payload(Route::Location, LOCATION_TOPIC, payload).unwrap();

        let Decoded::Location(event) = decoded else { panic!("expected location") };
        assert_eq!(event.device, DeviceKey::from("phone_alice"));
        assert_eq!(event.host_name, "phone");
        assert_eq!(event.gps, Gps::new(1.0, 2.0));
        assert_eq!(event.accuracy, Some(5.0));
        assert_eq!(event.battery, Some(77));
    }

    #[test]
    fn test_decode_location_tolerates_odd_battery() {
        let cases: [(&[u8], Option<u8>); 4] = [
            (br#"{"_type":"location","lat":1.0,"lon":2.0,"batt":85.6}"#, Some(86)),
            (br#"{"_type":"location","lat":1.0,"lon":2.0,"batt":300}"#, None),
            (br#"{"_type":"location","lat":1.0,"lon":2.0,"batt":-1}"#, None),
            (br#"{"_type":"location","lat":1.0,"lon":2.0,"batt":"full"}"#, None),
        ];
        for (payload, battery) in cases {
            let decoded = decode_payload(Route::Location, LOCATION_TOPIC, payload).unwrap();
            let Decoded::Location(event) = decoded else { panic!("expected location") };
            assert_eq!(event.gps, Gps::new(1.0, 2.0));
            assert_eq!(event.battery, battery);
        }
    }

    #[test]
    fn test_decode_location_missing_lon() {
        let payload = br#"{"_type":"location","lat":1.0}"#;
        let err = decode_payload(Route::Location, LOCATION_TOPIC, payload).unwrap_err();
        assert!(matches!(err, PresenceError::MissingField { field: "lon", .. }));
    }

    #[test]
    fn test_decode_transition() {
        let payload =
            br#"{"_type":"transition","event":"leave","desc":"-Work","t":"c","lat":3.0,"lon":4.0,"acc":12}"#;
        let decoded = decode_payload(Route::Event, EVENT_TOPIC, payload).unwrap();

        let Decoded::Transition(event) = decoded else { panic!("expected transition") };
        assert_eq!(event.desc, "-Work");
        assert_eq!(event.location_name(), "Work");
        assert_eq!(event.kind, TransitionKind::Region);
        assert_eq!(event.direction, Direction::Leave);
        assert_eq!(event.gps, Some(Gps::new(3.0, 4.0)));
        assert_eq!(event.accuracy, Some(12.0));
    }

    #[test]
    fn test_decode_beacon_transition_without_coordinates() {
        let payload = br#"{"_type":"transition","event":"enter","desc":"Home","t":"b"}"#;
        let decoded = decode_payload(Route::Event, EVENT_TOPIC, payload).unwrap();

        let Decoded::Transition(event) = decoded else { panic!("expected transition") };
        assert_eq!(event.kind, TransitionKind::Beacon);
        assert_eq!(event.gps, None);
    }

    #[test]
    fn test_decode_transition_missing_fields() {
        for (payload, field) in [
            (&br#"{"_type":"transition","event":"enter","t":"c"}"#[..], "desc"),
            (&br#"{"_type":"transition","desc":"Work","t":"c"}"#[..], "event"),
            (&br#"{"_type":"transition","event":"enter","desc":"Work"}"#[..], "t"),
        ] {
            let err = decode_payload(Route::Event, EVENT_TOPIC, payload).unwrap_err();
            assert!(
                matches!(err, PresenceError::MissingField { field: f, .. } if f == field),
                "expected missing {field}, got {err}"
            );
        }
    }

    #[test]
    fn test_decode_unknown_event_is_protocol_error() {
        let payload = br#"{"_type":"transition","event":"wander","desc":"Work","t":"c"}"#;
        let err = decode_payload(Route::Event, EVENT_TOPIC, payload).unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_decode_invalid_json() {
        let err = decode_payload(Route::Location, LOCATION_TOPIC, b"not json").unwrap_err();
        assert!(matches!(err, PresenceError::InvalidJson(_)));
        assert!(!err.is_protocol());
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let err = decode_payload(Route::Location, LOCATION_TOPIC, &[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, PresenceError::InvalidUtf8(_)));
    }

    #[test]
    fn test_decode_wrong_field_type() {
        let payload = br#"{"_type":"location","lat":"north","lon":2.0}"#;
        let err = decode_payload(Route::Location, LOCATION_TOPIC, payload).unwrap_err();
        assert!(matches!(err, PresenceError::InvalidJson(_)));
    }

    #[test]
    fn test_decode_not_applicable() {
        // Other message types
        let waypoint = br#"{"_type":"waypoint","desc":"Work"}"#;
        assert_eq!(
            decode_payload(Route::Location, LOCATION_TOPIC, waypoint).unwrap(),
            Decoded::NotApplicable
        );
        // Missing discriminator
        assert_eq!(
            decode_payload(Route::Location, LOCATION_TOPIC, br#"{"lat":1.0,"lon":2.0}"#).unwrap(),
            Decoded::NotApplicable
        );
        // Valid JSON that is not an object
        assert_eq!(
            decode_payload(Route::Location, LOCATION_TOPIC, b"[1, 2]").unwrap(),
            Decoded::NotApplicable
        );
        // Transition on the location tree
        let transition = br#"{"_type":"transition","event":"enter","desc":"Work","t":"c"}"#;
        assert_eq!(
            decode_payload(Route::Location, LOCATION_TOPIC, transition).unwrap(),
            Decoded::NotApplicable
        );
    }
}
