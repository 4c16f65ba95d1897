//! Recursive flattening of nested JSON into path-joined keys.
//!
//! ffprobe reports are trees (`format.tags.title`, per-stream `disposition`
//! blocks, ...). The result store is flat, so every leaf becomes one column
//! whose name is the path joined with underscores. Stream sections are
//! prefixed with their ordinal index and codec type so multiple streams never
//! collide (`stream_0_video_codec_name`, `stream_1_audio_codec_name`).

use std::collections::BTreeMap;

use serde_json::Value;

use super::MediaReport;

/// Flattens `value` under `prefix` into `out`, one entry per leaf.
///
/// Scalars render without JSON quoting; arrays are kept as their JSON text
/// since the store has no good row representation for them.
pub fn flatten_value(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let joined = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}_{key}")
                };
                flatten_value(&joined, nested, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Null => {
            out.insert(prefix.to_string(), String::new());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

/// Projects a media report into flat result-store fields.
///
/// The format block flattens under `format_`, each stream under
/// `stream_<idx>_<codec_type>_`, and `file_size_bytes` is pulled out of the
/// format block as a top-level column for easy access.
pub fn report_fields(report: &MediaReport) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    flatten_value("format", &Value::Object(report.format.clone()), &mut fields);
    if let Some(size) = report.format.get("size") {
        let size = match size {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        fields.insert("file_size_bytes".to_string(), size);
    }

    for (idx, stream) in report.streams.iter().enumerate() {
        let codec_type = stream
            .get("codec_type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let prefix = format!("stream_{idx}_{codec_type}");
        flatten_value(&prefix, &Value::Object(stream.clone()), &mut fields);
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected JSON object"),
        }
    }

    #[test]
    fn flattens_arbitrary_nesting_depth() {
        let value = json!({
            "duration": "12.5",
            "tags": {
                "title": "clip",
                "encoder": { "name": "lavf", "version": 61 }
            }
        });
        let mut out = BTreeMap::new();
        flatten_value("format", &value, &mut out);

        assert_eq!(out.get("format_duration").map(String::as_str), Some("12.5"));
        assert_eq!(out.get("format_tags_title").map(String::as_str), Some("clip"));
        assert_eq!(
            out.get("format_tags_encoder_name").map(String::as_str),
            Some("lavf")
        );
        assert_eq!(
            out.get("format_tags_encoder_version").map(String::as_str),
            Some("61")
        );
    }

    #[test]
    fn scalar_rendering_drops_json_quoting() {
        let value = json!({ "a": "text", "b": 3, "c": true, "d": null });
        let mut out = BTreeMap::new();
        flatten_value("x", &value, &mut out);

        assert_eq!(out.get("x_a").map(String::as_str), Some("text"));
        assert_eq!(out.get("x_b").map(String::as_str), Some("3"));
        assert_eq!(out.get("x_c").map(String::as_str), Some("true"));
        assert_eq!(out.get("x_d").map(String::as_str), Some(""));
    }

    #[test]
    fn streams_are_prefixed_by_ordinal_and_codec_type() {
        let report = MediaReport {
            format: as_map(json!({ "size": "5242880", "format_name": "mov,mp4" })),
            streams: vec![
                as_map(json!({ "codec_type": "video", "codec_name": "h264" })),
                as_map(json!({ "codec_type": "audio", "codec_name": "aac" })),
            ],
        };

        let fields = report_fields(&report);
        assert_eq!(
            fields.get("stream_0_video_codec_name").map(String::as_str),
            Some("h264")
        );
        assert_eq!(
            fields.get("stream_1_audio_codec_name").map(String::as_str),
            Some("aac")
        );
        assert_eq!(
            fields.get("file_size_bytes").map(String::as_str),
            Some("5242880")
        );
        assert_eq!(
            fields.get("format_format_name").map(String::as_str),
            Some("mov,mp4")
        );
    }

    #[test]
    fn missing_codec_type_falls_back_to_unknown() {
        let report = MediaReport {
            format: serde_json::Map::new(),
            streams: vec![as_map(json!({ "codec_name": "bin" }))],
        };
        let fields = report_fields(&report);
        assert_eq!(
            fields.get("stream_0_unknown_codec_name").map(String::as_str),
            Some("bin")
        );
    }
}
