//! `resources/list` and `resources/read`: expose every indexed artifact as
//! an `artifact://` resource.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use ccsa_protocol::{ArtifactUri, UriError};
use ccsa_store::{ArtifactService, Selector};

/// List every indexed artifact as a resource, named by its current alias.
pub fn list_resources(service: &ArtifactService) -> Result<Value, String> {
    let artifacts = service
        .list("", 1000)
        .map_err(|e| e.kind().tool_message(&e.detail()))?;
    let resources: Vec<Value> = artifacts
        .iter()
        .map(|a| {
            json!({
                "uri": ArtifactUri::for_name(a.name.clone()).to_string(),
                "name": a.name,
                "mimeType": a.mime_type,
            })
        })
        .collect();
    Ok(json!({ "resources": resources }))
}

fn is_text_like(mime: &str) -> bool {
    mime.starts_with("text/") || mime.ends_with("+json") || mime == "application/json"
}

/// Read one resource by URI. Recoverable failures (malformed URI, not
/// found) are encoded as an `"error: "`-prefixed text content block per
/// §4.5; only genuinely unrecoverable failures should be surfaced by the
/// caller as a JSON-RPC error instead.
pub fn read_resource(service: &ArtifactService, uri: &str) -> Value {
    let selector = match ArtifactUri::parse(uri) {
        Ok(ArtifactUri::Ref(r)) => Selector::Ref(r),
        Ok(ArtifactUri::Name(n)) => Selector::Name(n),
        Err(UriError::UnsupportedScheme) => {
            return error_contents(uri, "unsupported URI scheme, expected \"artifact\"")
        }
        Err(UriError::Malformed(detail)) => {
            return error_contents(uri, &format!("malformed artifact URI: {detail}"))
        }
    };

    match service.get(selector) {
        Ok((artifact, bytes)) => {
            let mut content = json!({
                "uri": uri,
                "mimeType": artifact.mime_type,
            });
            let obj = content.as_object_mut().unwrap();
            if is_text_like(&artifact.mime_type) {
                obj.insert(
                    "text".to_string(),
                    Value::String(String::from_utf8_lossy(&bytes).to_string()),
                );
            } else {
                obj.insert("blob".to_string(), Value::String(STANDARD.encode(&bytes)));
            }
            json!({ "contents": [content] })
        }
        Err(e) => error_contents(uri, &e.kind().tool_message(&e.detail())),
    }
}

fn error_contents(uri: &str, message: &str) -> Value {
    json!({
        "contents": [{
            "uri": uri,
            "mimeType": "text/plain",
            "text": format!("error: {message}"),
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccsa_store::SaveTextParams;
    use tempfile::tempdir;

    #[test]
    fn lists_every_saved_artifact_as_a_resource() {
        let dir = tempdir().unwrap();
        let service = ArtifactService::new(dir.path());
        service
            .save_text(SaveTextParams {
                name: "plan/a".to_string(),
                text: "x".to_string(),
                mime_type: None,
                expected_prev_ref: None,
            })
            .unwrap();
        let listed = list_resources(&service).unwrap();
        let resources = listed["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0]["uri"], "artifact://name/plan/a");
    }

    #[test]
    fn reads_text_content_by_name_uri() {
        let dir = tempdir().unwrap();
        let service = ArtifactService::new(dir.path());
        service
            .save_text(SaveTextParams {
                name: "plan/a".to_string(),
                text: "hello".to_string(),
                mime_type: None,
                expected_prev_ref: None,
            })
            .unwrap();
        let result = read_resource(&service, "artifact://name/plan/a");
        assert_eq!(result["contents"][0]["text"], "hello");
    }

    #[test]
    fn not_found_becomes_error_prefixed_text() {
        let dir = tempdir().unwrap();
        let service = ArtifactService::new(dir.path());
        let result = read_resource(&service, "artifact://name/absent");
        let text = result["contents"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("error: "));
    }

    #[test]
    fn unsupported_scheme_becomes_error_prefixed_text() {
        let dir = tempdir().unwrap();
        let service = ArtifactService::new(dir.path());
        let result = read_resource(&service, "http://example/a");
        let text = result["contents"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("error: unsupported URI scheme"));
    }
}
