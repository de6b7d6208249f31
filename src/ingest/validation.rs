//! Ingestion boundary validation
//!
//! Payloads arrive from many browser builds and are loosely shaped. They are
//! turned into a typed [`EventRecord`] exactly once, here. Optional metadata
//! that is missing gets a neutral default; anything the estimator depends on
//! (video id, click id, dwell, estimate) must be present and in range.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::IngestError;
use crate::types::{ClickEvent, EventKind, EventRecord, Fraction, Platform, ReturnEvent};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClickPayload {
    id: Option<String>,
    video_id: String,
    #[serde(default)]
    video_title: String,
    platform: Option<Platform>,
    /// Outbound URL, used to infer the platform when none is sent
    video_url: Option<String>,
    click_time: Option<DateTime<Utc>>,
    #[serde(default)]
    session_id: String,
    user_id: Option<String>,
    #[serde(default)]
    referrer: String,
    #[serde(default)]
    user_agent: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReturnPayload {
    id: Option<String>,
    click_id: String,
    return_time: Option<DateTime<Utc>>,
    time_spent_ms: f64,
    estimated_watch_percentage: f64,
    #[serde(default)]
    session_id: String,
    user_id: Option<String>,
}

/// Split a batch entry `{ "type": ..., "data": {...} }` into kind + payload.
pub fn parse_envelope(entry: Value) -> Result<(EventKind, Value), IngestError> {
    let Value::Object(mut map) = entry else {
        return Err(IngestError::MalformedEnvelope(
            "batch entry is not a JSON object".to_string(),
        ));
    };

    let kind = match map.remove("type") {
        Some(Value::String(s)) => s
            .parse::<EventKind>()
            .map_err(IngestError::UnknownType)?,
        Some(other) => return Err(IngestError::UnknownType(other.to_string())),
        None => {
            return Err(IngestError::MalformedEnvelope(
                "missing 'type' field".to_string(),
            ))
        }
    };

    let data = map.remove("data").unwrap_or(Value::Null);
    Ok((kind, data))
}

/// Validate one payload of a known kind.
pub fn parse_record(
    kind: EventKind,
    data: Value,
    received_at: DateTime<Utc>,
) -> Result<EventRecord, IngestError> {
    if !data.is_object() {
        return Err(malformed(kind, "data must be a JSON object"));
    }

    match kind {
        EventKind::Click => {
            let p: ClickPayload =
                serde_json::from_value(data).map_err(|e| malformed(kind, e.to_string()))?;
            click_from_payload(p, received_at).map(EventRecord::Click)
        }
        EventKind::Return => {
            let p: ReturnPayload =
                serde_json::from_value(data).map_err(|e| malformed(kind, e.to_string()))?;
            return_from_payload(p, received_at).map(EventRecord::Return)
        }
    }
}

fn click_from_payload(p: ClickPayload, received_at: DateTime<Utc>) -> Result<ClickEvent, IngestError> {
    let video_id = p.video_id.trim().to_string();
    if video_id.is_empty() {
        return Err(malformed(EventKind::Click, "videoId must not be empty"));
    }

    let platform = p
        .platform
        .or_else(|| p.video_url.as_deref().map(Platform::detect))
        .unwrap_or_default();

    Ok(ClickEvent {
        id: non_empty_or_new(p.id),
        video_id,
        video_title: p.video_title,
        platform,
        click_time: p.click_time.unwrap_or(received_at),
        session_id: p.session_id,
        user_id: p.user_id.filter(|u| !u.is_empty()),
        referrer: p.referrer,
        user_agent: p.user_agent,
    })
}

fn return_from_payload(p: ReturnPayload, received_at: DateTime<Utc>) -> Result<ReturnEvent, IngestError> {
    let click_id = p.click_id.trim().to_string();
    if click_id.is_empty() {
        return Err(malformed(EventKind::Return, "clickId must not be empty"));
    }

    if !p.time_spent_ms.is_finite() || p.time_spent_ms < 0.0 {
        return Err(malformed(
            EventKind::Return,
            format!("timeSpentMs must be a non-negative number (got {})", p.time_spent_ms),
        ));
    }

    let estimate = Fraction::new(p.estimated_watch_percentage).ok_or_else(|| {
        malformed(
            EventKind::Return,
            format!(
                "estimatedWatchPercentage must be within [0, 1] (got {})",
                p.estimated_watch_percentage
            ),
        )
    })?;

    Ok(ReturnEvent {
        id: non_empty_or_new(p.id),
        click_id,
        return_time: p.return_time.unwrap_or(received_at),
        time_spent_ms: p.time_spent_ms.round() as u64,
        estimated_watch_percentage: estimate,
        session_id: p.session_id,
        user_id: p.user_id.filter(|u| !u.is_empty()),
    })
}

fn non_empty_or_new(id: Option<String>) -> String {
    match id {
        Some(id) if !id.trim().is_empty() => id,
        _ => Uuid::new_v4().to_string(),
    }
}

fn malformed(kind: EventKind, reason: impl Into<String>) -> IngestError {
    IngestError::Malformed {
        kind,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        "2026-08-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_click_with_partial_fields() {
        let record = parse_record(
            EventKind::Click,
            json!({ "videoId": "v-42", "videoUrl": "https://www.youtube.com/shorts/x" }),
            now(),
        )
        .unwrap();
        let EventRecord::Click(click) = record else { panic!("expected click") };
        assert_eq!(click.video_id, "v-42");
        assert_eq!(click.platform, Platform::ShortForm);
        assert_eq!(click.click_time, now());
        assert!(!click.id.is_empty());
    }

    #[test]
    fn test_explicit_platform_wins_over_url() {
        let record = parse_record(
            EventKind::Click,
            json!({
                "id": "c1",
                "videoId": "v",
                "platform": "long-form",
                "videoUrl": "https://tiktok.com/@a/video/1"
            }),
            now(),
        )
        .unwrap();
        let EventRecord::Click(click) = record else { panic!("expected click") };
        assert_eq!(click.platform, Platform::LongForm);
        assert_eq!(click.id, "c1");
    }

    #[test]
    fn test_click_requires_video_id() {
        let err = parse_record(EventKind::Click, json!({ "videoId": "  " }), now()).unwrap_err();
        assert!(matches!(err, IngestError::Malformed { kind: EventKind::Click, .. }));
        let err = parse_record(EventKind::Click, json!({ "videoTitle": "x" }), now()).unwrap_err();
        assert!(err.to_string().contains("videoId"));
    }

    #[test]
    fn test_return_range_checks() {
        let ok = parse_record(
            EventKind::Return,
            json!({ "clickId": "c1", "timeSpentMs": 5400.4, "estimatedWatchPercentage": 0.5 }),
            now(),
        )
        .unwrap();
        let EventRecord::Return(ret) = ok else { panic!("expected return") };
        assert_eq!(ret.time_spent_ms, 5400);

        let negative = parse_record(
            EventKind::Return,
            json!({ "clickId": "c1", "timeSpentMs": -1, "estimatedWatchPercentage": 0.5 }),
            now(),
        );
        assert!(negative.is_err());

        // A 0-100 value sent on the 0-1 field is rejected, not rescaled
        let wrong_scale = parse_record(
            EventKind::Return,
            json!({ "clickId": "c1", "timeSpentMs": 1000, "estimatedWatchPercentage": 76.5 }),
            now(),
        );
        assert!(wrong_scale.unwrap_err().to_string().contains("[0, 1]"));
    }

    #[test]
    fn test_envelope_parsing() {
        let (kind, data) = parse_envelope(json!({ "type": "return", "data": { "a": 1 } })).unwrap();
        assert_eq!(kind, EventKind::Return);
        assert_eq!(data["a"], 1);

        assert!(matches!(
            parse_envelope(json!({ "type": "view", "data": {} })),
            Err(IngestError::UnknownType(t)) if t == "view"
        ));
        assert!(matches!(
            parse_envelope(json!("click")),
            Err(IngestError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            parse_envelope(json!({ "data": {} })),
            Err(IngestError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_non_object_data_rejected() {
        assert!(parse_record(EventKind::Click, Value::Null, now()).is_err());
        assert!(parse_record(EventKind::Return, json!([1, 2]), now()).is_err());
    }
}
