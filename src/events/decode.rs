// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Decoding of contract log lines and sync-endpoint payloads.
//!
//! Both paths collect named string fields first, then build the same typed
//! payloads, so a log line and its JSON equivalent decode identically.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::*;

/// Separator between tag and fields in a log line.
const FIELD_SEPARATOR: char = ':';

/// Errors turning raw input into a [`ChainEvent`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("log is not valid UTF-8")]
    NotUtf8,

    #[error("log is empty")]
    Empty,

    #[error("{tag} expects {expected} fields, found {found}")]
    FieldCount {
        tag: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("field {field} is not a valid integer: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field {field} must be a string or number")]
    InvalidFieldType { field: &'static str },
}

/// Named field values collected from a log line or JSON object.
struct Fields {
    values: BTreeMap<&'static str, String>,
}

impl Fields {
    fn text(&self, name: &'static str) -> Result<String, DecodeError> {
        match self.values.get(name) {
            Some(value) if !value.is_empty() => Ok(value.clone()),
            _ => Err(DecodeError::MissingField(name)),
        }
    }

    fn optional_text(&self, name: &'static str) -> Option<String> {
        self.values.get(name).filter(|v| !v.is_empty()).cloned()
    }

    fn number<T: std::str::FromStr>(&self, name: &'static str) -> Result<T, DecodeError> {
        let raw = self.text(name)?;
        raw.trim().parse().map_err(|_| DecodeError::InvalidNumber {
            field: name,
            value: raw,
        })
    }
}

/// Decode one contract log line (already base64-decoded).
///
/// Unknown tags yield [`ChainEvent::Unrecognized`]; known tags must carry
/// exactly the expected number of fields.
pub fn decode_log(bytes: &[u8]) -> Result<ChainEvent, DecodeError> {
    let line = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;
    if line.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut parts = line.split(FIELD_SEPARATOR);
    let tag = parts.next().unwrap_or_default();
    let values: Vec<&str> = parts.collect();

    let Some(kind) = EventKind::from_tag(tag) else {
        return Ok(ChainEvent::Unrecognized {
            tag: tag.to_string(),
            fields: values.into_iter().map(str::to_string).collect(),
        });
    };

    let names = kind.fields();
    if values.len() != names.len() {
        return Err(DecodeError::FieldCount {
            tag: kind.tag(),
            expected: names.len(),
            found: values.len(),
        });
    }

    let fields = Fields {
        values: names
            .iter()
            .copied()
            .zip(values.into_iter().map(str::to_string))
            .collect(),
    };
    build(kind, &fields)
}

/// Decode an event posted to the sync endpoint.
///
/// Values may be strings or numbers. `ngoAddress` is optional here since the
/// caller may rely on the transaction sender instead.
pub fn decode_json(event_type: &str, event_data: &Map<String, Value>) -> Result<ChainEvent, DecodeError> {
    let Some(kind) = EventKind::from_tag(event_type) else {
        return Ok(ChainEvent::Unrecognized {
            tag: event_type.to_string(),
            fields: Vec::new(),
        });
    };

    let mut values = BTreeMap::new();
    for name in kind.fields() {
        let value = match event_data.get(*name) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => return Err(DecodeError::InvalidFieldType { field: name }),
        };
        values.insert(*name, value);
    }

    build(kind, &Fields { values })
}

fn build(kind: EventKind, f: &Fields) -> Result<ChainEvent, DecodeError> {
    let event = match kind {
        EventKind::FiatDeposit => FiatDeposit {
            user_address: f.text("userAddress")?,
            amount_micro: f.number("amount")?,
            stripe_payment_id: f.text("stripePaymentId")?,
            timestamp: f.number("timestamp")?,
        }
        .into(),
        EventKind::NgoAuthorized => NgoAuthorized {
            user_address: f.text("userAddress")?,
            rating: f.number("rating")?,
            region: f.text("region")?,
            timestamp: f.number("timestamp")?,
        }
        .into(),
        EventKind::CrisisBadgeIssued => CrisisBadgeIssued {
            user_address: f.text("userAddress")?,
            case_id: f.text("caseId")?,
            crisis_type: f.text("crisisType")?,
            severity: f.number("severity")?,
            ngo_address: f.optional_text("ngoAddress"),
            timestamp: f.number("timestamp")?,
        }
        .into(),
        EventKind::EmergencyDisbursal => EmergencyDisbursal {
            user_address: f.text("userAddress")?,
            amount_micro: f.number("amount")?,
            case_id: f.text("caseId")?,
            ngo_address: f.optional_text("ngoAddress"),
            timestamp: f.number("timestamp")?,
        }
        .into(),
        EventKind::TokenTransfer => TokenTransfer {
            from_address: f.text("fromAddress")?,
            to_address: f.text("toAddress")?,
            amount_micro: f.number("amount")?,
            reference: f.text("reference")?,
            timestamp: f.number("timestamp")?,
        }
        .into(),
        EventKind::VirtualCardCreated => VirtualCardCreated {
            user_address: f.text("userAddress")?,
            card_limit_micro: f.number("cardLimit")?,
            card_type: f.text("cardType")?,
            timestamp: f.number("timestamp")?,
        }
        .into(),
        EventKind::SystemUpdated => SystemUpdated {
            setting_key: f.text("settingKey")?,
            setting_value_micro: f.number("settingValue")?,
            reason: f.text("reason")?,
            timestamp: f.number("timestamp")?,
        }
        .into(),
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn decodes_fiat_deposit_log() {
        let event = decode_log(b"FIAT_DEPOSIT:ADDR1:5000000:pi_123:1700000000").unwrap();
        assert_eq!(
            event,
            ChainEvent::FiatDeposit(FiatDeposit {
                user_address: "ADDR1".into(),
                amount_micro: 5_000_000,
                stripe_payment_id: "pi_123".into(),
                timestamp: 1_700_000_000,
            })
        );
    }

    #[test]
    fn decodes_every_known_tag() {
        let lines: [&[u8]; 7] = [
            b"FIAT_DEPOSIT:A:1:pi:0",
            b"NGO_AUTHORIZED:A:8:Pacific:0",
            b"CRISIS_BADGE_ISSUED:A:case-1:cyclone:4:NGO:0",
            b"EMERGENCY_DISBURSAL:A:250000000:case-1:NGO:0",
            b"TOKEN_TRANSFER:A:B:1000000:ref:0",
            b"VIRTUAL_CARD_CREATED:A:100000000:debit:0",
            b"SYSTEM_UPDATED:fee_rate:25000:adjust:0",
        ];
        for (line, kind) in lines.iter().zip(EventKind::ALL) {
            let event = decode_log(line).unwrap();
            assert_eq!(event.kind(), Some(kind), "{}", String::from_utf8_lossy(line));
        }
    }

    #[test]
    fn unknown_tag_is_unrecognized() {
        let event = decode_log(b"PRICE_UPDATED:ALGO:123").unwrap();
        assert_eq!(
            event,
            ChainEvent::Unrecognized {
                tag: "PRICE_UPDATED".into(),
                fields: vec!["ALGO".into(), "123".into()],
            }
        );
    }

    #[test]
    fn rejects_wrong_field_count() {
        let err = decode_log(b"FIAT_DEPOSIT:ADDR1:5000000:pi_123").unwrap_err();
        assert_eq!(
            err,
            DecodeError::FieldCount {
                tag: "FIAT_DEPOSIT",
                expected: 4,
                found: 3
            }
        );

        let err = decode_log(b"FIAT_DEPOSIT:ADDR1:5000000:pi:123:extra").unwrap_err();
        assert!(matches!(err, DecodeError::FieldCount { found: 5, .. }));
    }

    #[test]
    fn rejects_non_integer_amount() {
        let err = decode_log(b"FIAT_DEPOSIT:ADDR1:5.5:pi_123:0").unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidNumber {
                field: "amount",
                value: "5.5".into()
            }
        );

        let err = decode_log(b"TOKEN_TRANSFER:A:B:-1:ref:0").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidNumber { field: "amount", .. }));
    }

    #[test]
    fn rating_and_severity_are_not_range_checked() {
        let event = decode_log(b"NGO_AUTHORIZED:A:42:Pacific:0").unwrap();
        match event {
            ChainEvent::NgoAuthorized(p) => assert_eq!(p.rating, 42),
            other => panic!("unexpected {other:?}"),
        }

        let event = decode_log(b"CRISIS_BADGE_ISSUED:A:c:flood:0:N:0").unwrap();
        match event {
            ChainEvent::CrisisBadgeIssued(p) => assert_eq!(p.severity, 0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_and_invalid_utf8() {
        assert_eq!(decode_log(b""), Err(DecodeError::Empty));
        assert_eq!(decode_log(&[0xff, 0xfe]), Err(DecodeError::NotUtf8));
    }

    #[test]
    fn rejects_empty_required_field() {
        let err = decode_log(b"FIAT_DEPOSIT::5000000:pi_123:0").unwrap_err();
        assert_eq!(err, DecodeError::MissingField("userAddress"));
    }

    #[test]
    fn json_accepts_strings_and_numbers() {
        let data = object(json!({
            "userAddress": "ADDR1",
            "amount": 5000000,
            "stripePaymentId": "pi_123",
            "timestamp": "1700000000"
        }));
        let from_json = decode_json("FIAT_DEPOSIT", &data).unwrap();
        let from_log = decode_log(b"FIAT_DEPOSIT:ADDR1:5000000:pi_123:1700000000").unwrap();
        assert_eq!(from_json, from_log);
    }

    #[test]
    fn json_ngo_address_is_optional() {
        let data = object(json!({
            "userAddress": "ADDR1",
            "amount": "1000000",
            "caseId": "case-1",
            "timestamp": 0
        }));
        match decode_json("EMERGENCY_DISBURSAL", &data).unwrap() {
            ChainEvent::EmergencyDisbursal(p) => assert_eq!(p.ngo_address, None),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn json_reports_missing_and_mistyped_fields() {
        let data = object(json!({ "userAddress": "ADDR1", "timestamp": 0 }));
        assert_eq!(
            decode_json("FIAT_DEPOSIT", &data),
            Err(DecodeError::MissingField("amount"))
        );

        let data = object(json!({
            "userAddress": ["ADDR1"],
            "amount": 1,
            "stripePaymentId": "pi",
            "timestamp": 0
        }));
        assert_eq!(
            decode_json("FIAT_DEPOSIT", &data),
            Err(DecodeError::InvalidFieldType { field: "userAddress" })
        );
    }

    #[test]
    fn json_unknown_type_is_unrecognized() {
        let event = decode_json("SOMETHING_ELSE", &Map::new()).unwrap();
        assert_eq!(event.kind(), None);
        assert_eq!(event.tag(), "SOMETHING_ELSE");
    }
}
