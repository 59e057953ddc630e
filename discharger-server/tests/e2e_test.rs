//! End-to-end integration tests
//!
//! Runs the full router on an ephemeral port with a scripted model and a
//! recording SMS gateway, and drives it over HTTP:
//! generate -> save summary -> translate -> edit -> share -> public view.

use discharger_core::generation::GENERATION_SCHEMA_NAME;
use discharger_core::translation::TRANSLATION_SCHEMA_NAME;
use discharger_core::{LlmError, MockLlmClient, StructuredRequest};
use discharger_server::config::{ApiKey, ServerConfig};
use discharger_server::sms::RecordingSms;
use discharger_server::{build_router, AppState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;

const DISCHARGE_TEXT: &str = "Patient admitted with atrial fibrillation. Start apixaban 5 mg twice daily. \
Return to the emergency department if you notice black stools or vomit blood.";

const BOUNDARY: &str = "discharger-e2e-boundary";

struct TestServer {
    base_url: String,
    llm: Arc<MockLlmClient>,
    sms: Arc<RecordingSms>,
    _dir: TempDir,
}

/// Generation returns a medication and a red flag block; translation echoes
/// the payload with prefixed titles.
fn scripted_model(request: &StructuredRequest) -> Result<Value, LlmError> {
    if request.schema_name == GENERATION_SCHEMA_NAME {
        return Ok(json!({
            "blocks": [
                {
                    "type": "medication",
                    "title": "Your medicines",
                    "data": {
                        "medications": [{
                            "name": "Apixaban",
                            "dosage": "5 mg",
                            "frequency": "twice daily",
                            "duration": null,
                            "instructions": null,
                            "status": "new"
                        }]
                    },
                    "citations": [
                        { "source": "context", "excerpt": "Start apixaban 5 mg twice daily." }
                    ]
                },
                {
                    "type": "redFlag",
                    "title": "When to get help",
                    "data": {
                        "symptoms": [{
                            "symptom": "Black stools",
                            "description": null,
                            "severity": "emergency",
                            "action": "Go to the emergency department"
                        }]
                    },
                    "citations": []
                }
            ]
        }));
    }

    if request.schema_name == TRANSLATION_SCHEMA_NAME {
        let mut payload = request.payload.clone().unwrap_or_else(|| json!({ "blocks": [] }));
        if let Some(blocks) = payload["blocks"].as_array_mut() {
            for block in blocks {
                let title = block["title"].as_str().unwrap_or_default().to_string();
                block["title"] = json!(format!("ES {}", title));
            }
        }
        return Ok(payload);
    }

    Err(LlmError::MalformedResponse(format!(
        "unexpected schema {}",
        request.schema_name
    )))
}

async fn start_server_with(configure: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let dir = TempDir::new().unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);

    let mut config = ServerConfig::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.share.public_base_url = base_url.clone();
    configure(&mut config);

    let llm = Arc::new(MockLlmClient::with_responder(scripted_model));
    let sms = Arc::new(RecordingSms::new());
    let state = AppState::open(config, llm.clone(), sms.clone()).unwrap();
    let app = build_router(Arc::new(state));

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        base_url,
        llm,
        sms,
        _dir: dir,
    }
}

/// Auth disabled: every request runs as the development user
async fn start_test_server() -> TestServer {
    start_server_with(|_| {}).await
}

fn multipart_body(parts: &[(&str, Option<(&str, &str)>, &str)]) -> String {
    let mut body = String::new();
    for (name, file, content) in parts {
        body.push_str(&format!("--{}\r\n", BOUNDARY));
        match file {
            Some((file_name, content_type)) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                name, file_name, content_type
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                name
            )),
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));
    body
}

async fn upload(
    client: &reqwest::Client,
    server: &TestServer,
    parts: &[(&str, Option<(&str, &str)>, &str)],
) -> reqwest::Response {
    client
        .post(format!("{}/api/documents", server.base_url))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(multipart_body(parts))
        .send()
        .await
        .unwrap()
}

async fn generate(client: &reqwest::Client, server: &TestServer) -> Value {
    let resp = client
        .post(format!("{}/api/generate", server.base_url))
        .json(&json!({ "text": DISCHARGE_TEXT, "blockTypes": ["medication", "redFlag"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

async fn create_summary(client: &reqwest::Client, server: &TestServer) -> Value {
    let generated = generate(client, server).await;
    let resp = client
        .post(format!("{}/api/summaries", server.base_url))
        .json(&json!({
            "title": "Discharge after AF admission",
            "dischargeText": DISCHARGE_TEXT,
            "blocks": generated["blocks"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    resp.json().await.unwrap()
}

async fn translate(client: &reqwest::Client, server: &TestServer, id: &str, locale: &str) -> reqwest::Response {
    client
        .post(format!("{}/api/summaries/{}/translations", server.base_url, id))
        .json(&json!({ "locale": locale }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_patient_crud() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/patients", server.base_url))
        .json(&json!({ "name": "Jane Doe", "dateOfBirth": "1950-04-02", "phoneNumber": "+31 6 1234 5678" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "POST should return 201 Created");
    let created: Value = resp.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["phoneNumber"], "+31612345678");
    assert_eq!(created["ownerId"], "dev-user");

    let resp = client
        .get(format!("{}/api/patients", server.base_url))
        .send()
        .await
        .unwrap();
    let list: Value = resp.json().await.unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);

    let resp = client
        .put(format!("{}/api/patients/{}", server.base_url, id))
        .json(&json!({ "name": "Jane Doe-Smith", "mrn": "MRN-77" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["name"], "Jane Doe-Smith");
    assert_eq!(updated["mrn"], "MRN-77");

    let resp = client
        .post(format!("{}/api/patients", server.base_url))
        .json(&json!({ "name": "Bad Date", "dateOfBirth": "02/04/1950" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .delete(format!("{}/api/patients/{}", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("{}/api/patients/{}", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_records_are_owner_scoped() {
    let server = start_server_with(|config| {
        config.auth.enabled = true;
        config.auth.api_keys = vec![
            ApiKey {
                name: "alice".to_string(),
                key: "alice-key".to_string(),
            },
            ApiKey {
                name: "bob".to_string(),
                key: "bob-key".to_string(),
            },
        ];
    })
    .await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/snippets", server.base_url))
        .bearer_auth("alice-key")
        .json(&json!({ "title": "Wound care", "content": "Keep the wound dry for 48 hours." }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let snippet: Value = resp.json().await.unwrap();
    let id = snippet["id"].as_str().unwrap();
    assert_eq!(snippet["ownerId"], "alice");

    let resp = client
        .get(format!("{}/api/snippets/{}", server.base_url, id))
        .bearer_auth("bob-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .get(format!("{}/api/snippets", server.base_url))
        .bearer_auth("bob-key")
        .send()
        .await
        .unwrap();
    let list: Value = resp.json().await.unwrap();
    assert!(list.as_array().unwrap().is_empty());

    let resp = client
        .get(format!("{}/api/snippets/{}", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_document_upload_serve_and_delete() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = upload(
        &client,
        &server,
        &[
            ("file", Some(("labs.txt", "text/plain")), "INR 2.4 on day of discharge"),
            ("file", Some(("scan.pdf", "application/pdf")), "%PDF-1.7"),
        ],
    )
    .await;
    assert_eq!(resp.status(), 201);
    let documents: Value = resp.json().await.unwrap();
    let documents = documents.as_array().unwrap();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0]["fullText"], "INR 2.4 on day of discharge");
    assert!(documents[1]["fullText"].is_null());

    let file_url = documents[0]["fileUrl"].as_str().unwrap().to_string();
    assert!(file_url.starts_with(&format!("{}/files/documents/dev-user/", server.base_url)));

    let resp = client.get(&file_url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/plain");
    assert_eq!(resp.text().await.unwrap(), "INR 2.4 on day of discharge");

    let id = documents[0]["id"].as_str().unwrap();
    let resp = client
        .delete(format!("{}/api/documents/{}", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("{}/api/documents/{}", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client.get(&file_url).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .get(format!("{}/api/documents", server.base_url))
        .send()
        .await
        .unwrap();
    let remaining: Value = resp.json().await.unwrap();
    assert_eq!(remaining.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_deleted_document_does_not_block_summary_edits() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = upload(
        &client,
        &server,
        &[
            ("file", Some(("labs.txt", "text/plain")), "INR 2.4 on day of discharge"),
            ("file", Some(("letter.txt", "text/plain")), "Follow up with cardiology"),
        ],
    )
    .await;
    let documents: Value = resp.json().await.unwrap();
    let deleted = documents[0]["id"].as_str().unwrap().to_string();
    let kept = documents[1]["id"].as_str().unwrap().to_string();

    let generated = generate(&client, &server).await;
    let resp = client
        .post(format!("{}/api/summaries", server.base_url))
        .json(&json!({
            "dischargeText": DISCHARGE_TEXT,
            "blocks": generated["blocks"],
            "documentIds": [deleted, kept],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let summary: Value = resp.json().await.unwrap();
    let id = summary["id"].as_str().unwrap();

    let resp = client
        .delete(format!("{}/api/documents/{}", server.base_url, deleted))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .post(format!("{}/api/summaries/{}/regenerate", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .put(format!("{}/api/summaries/{}", server.base_url, id))
        .json(&json!({ "title": "Discharge after AF admission" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["title"], "Discharge after AF admission");
    assert_eq!(updated["documentIds"], json!([kept]));

    // Newly supplied ids are still checked
    let resp = client
        .put(format!("{}/api/summaries/{}", server.base_url, id))
        .json(&json!({ "documentIds": [deleted] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_other_owners_documents_are_not_found() {
    let server = start_server_with(|config| {
        config.auth.enabled = true;
        config.auth.api_keys = vec![
            ApiKey {
                name: "alice".to_string(),
                key: "alice-key".to_string(),
            },
            ApiKey {
                name: "bob".to_string(),
                key: "bob-key".to_string(),
            },
        ];
    })
    .await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/documents", server.base_url))
        .bearer_auth("alice-key")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(multipart_body(&[(
            "file",
            Some(("labs.txt", "text/plain")),
            "INR 2.4 on day of discharge",
        )]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let documents: Value = resp.json().await.unwrap();
    let document_id = documents[0]["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{}/api/summaries", server.base_url))
        .bearer_auth("bob-key")
        .json(&json!({ "dischargeText": DISCHARGE_TEXT, "documentIds": [document_id] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{}/api/summaries", server.base_url))
        .bearer_auth("bob-key")
        .json(&json!({ "dischargeText": DISCHARGE_TEXT }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let summary: Value = resp.json().await.unwrap();

    let resp = client
        .post(format!(
            "{}/api/summaries/{}/citations",
            server.base_url,
            summary["id"].as_str().unwrap()
        ))
        .bearer_auth("bob-key")
        .json(&json!({ "source": "document", "documentId": document_id, "excerpt": "INR 2.4" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Addressed directly, the document is still reported as someone else's
    let resp = client
        .get(format!("{}/api/documents/{}", server.base_url, document_id))
        .bearer_auth("bob-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_upload_without_file_is_rejected() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = upload(&client, &server, &[("note", None, "no file here")]).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_generate_validation_and_output() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    for body in [
        json!({ "blockTypes": ["medication"] }),
        json!({ "text": 42, "blockTypes": ["medication"] }),
        json!({ "text": DISCHARGE_TEXT, "blockTypes": [] }),
        json!({ "text": DISCHARGE_TEXT, "blockTypes": "medication" }),
        json!({ "text": DISCHARGE_TEXT, "blockTypes": ["diagnosis"] }),
        json!({ "text": "   ", "blockTypes": ["medication"] }),
    ] {
        let resp = client
            .post(format!("{}/api/generate", server.base_url))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "body {} should be rejected", body);
    }
    assert_eq!(server.llm.call_count(), 0);

    let generated = generate(&client, &server).await;
    let blocks = generated["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0]["type"], "medication");
    assert_eq!(blocks[0]["version"], 1);
    assert_eq!(blocks[0]["isEditable"], true);
    assert_eq!(blocks[0]["data"]["medications"][0]["name"], "Apixaban");
    assert_eq!(blocks[1]["type"], "redFlag");
    assert_eq!(server.llm.call_count(), 1);

    // Model answer with an unrequested type
    let resp = client
        .post(format!("{}/api/generate", server.base_url))
        .json(&json!({ "text": DISCHARGE_TEXT, "blockTypes": ["medication"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Failed to generate blocks");
}

#[tokio::test]
async fn test_translation_lifecycle() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let summary = create_summary(&client, &server).await;
    let id = summary["id"].as_str().unwrap().to_string();
    assert_eq!(summary["status"], "draft");
    assert_eq!(summary["preferredLocale"], "en");

    let resp = translate(&client, &server, &id, "en").await;
    assert_eq!(resp.status(), 400, "same locale as source");

    let resp = translate(&client, &server, &id, "es").await;
    assert_eq!(resp.status(), 201);
    let translation: Value = resp.json().await.unwrap();
    assert_eq!(translation["locale"], "es");
    assert_eq!(translation["sourceLocale"], "en");
    let original = &summary["blocks"][0];
    let translated = &translation["blocks"][0];
    assert_eq!(translated["title"], "ES Your medicines");
    assert_eq!(translated["id"], original["id"]);
    assert_eq!(translated["version"], original["version"]);
    assert_eq!(translated["citations"], original["citations"]);
    assert_eq!(translated["data"]["medications"][0]["status"], "new");

    // A second translation is refused before the model is called
    let calls = server.llm.call_count();
    let resp = translate(&client, &server, &id, "es").await;
    assert_eq!(resp.status(), 409);
    assert_eq!(server.llm.call_count(), calls);

    let resp = client
        .get(format!("{}/api/summaries/{}/translations", server.base_url, id))
        .send()
        .await
        .unwrap();
    let list: Value = resp.json().await.unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);

    // Editing one block bumps only that block and drops the translations
    let mut blocks = summary["blocks"].clone();
    blocks[0]["title"] = json!("Medicines to take at home");
    let resp = client
        .put(format!("{}/api/summaries/{}/blocks", server.base_url, id))
        .json(&json!({ "blocks": blocks }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["blocks"][0]["version"], 2);
    assert_eq!(updated["blocks"][0]["id"], original["id"]);
    assert_eq!(updated["blocks"][1]["version"], 1);

    let resp = client
        .get(format!("{}/api/summaries/{}/translations/es", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Regenerating also drops translations
    let resp = translate(&client, &server, &id, "nl").await;
    assert_eq!(resp.status(), 201);
    let resp = client
        .post(format!("{}/api/summaries/{}/regenerate", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let regenerated: Value = resp.json().await.unwrap();
    assert_eq!(regenerated["blocks"][0]["title"], "Your medicines");

    let resp = client
        .get(format!("{}/api/summaries/{}/translations", server.base_url, id))
        .send()
        .await
        .unwrap();
    let list: Value = resp.json().await.unwrap();
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_citation_highlighting() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let summary = create_summary(&client, &server).await;
    let id = summary["id"].as_str().unwrap();
    let url = format!("{}/api/summaries/{}/citations", server.base_url, id);

    let resp = client
        .post(&url)
        .json(&json!({ "source": "context", "excerpt": "Start apixaban 5 mg twice daily." }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let view: Value = resp.json().await.unwrap();
    assert_eq!(view["highlight"]["match"]["kind"], "exact");
    assert!(view["marked"]
        .as_str()
        .unwrap()
        .contains("<mark>Start apixaban 5 mg twice daily.</mark>"));
    assert_eq!(view["segments"].as_array().unwrap().len(), 3);

    let resp = client
        .post(&url)
        .json(&json!({ "source": "context", "excerpt": "notice BLACK stools, or vomiting" }))
        .send()
        .await
        .unwrap();
    let view: Value = resp.json().await.unwrap();
    assert_eq!(view["highlight"]["match"]["kind"], "fuzzy");
    assert_eq!(view["highlight"]["match"]["words"], 4);

    let resp = client
        .post(&url)
        .json(&json!({ "source": "context", "excerpt": "dark tarry stools" }))
        .send()
        .await
        .unwrap();
    let view: Value = resp.json().await.unwrap();
    assert!(view["highlight"].is_null());

    let resp = client
        .post(&url)
        .json(&json!({ "source": "document", "documentId": "missing", "excerpt": "INR" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = upload(&client, &server, &[("file", Some(("scan.pdf", "application/pdf")), "%PDF")]).await;
    let documents: Value = resp.json().await.unwrap();
    let resp = client
        .post(&url)
        .json(&json!({ "source": "document", "documentId": documents[0]["id"], "excerpt": "PDF" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_sharing_and_public_view() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let summary = create_summary(&client, &server).await;
    let id = summary["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{}/api/summaries/{}/access-keys", server.base_url, id))
        .json(&json!({ "phoneNumber": "+1 (555) 010-9999", "role": "patient", "sendSms": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();
    assert_eq!(created["smsSent"], true);
    assert_eq!(created["key"]["phoneNumber"], "+15550109999");
    let key_id = created["key"]["id"].as_str().unwrap().to_string();
    let share_url = created["shareUrl"].as_str().unwrap().to_string();
    assert!(share_url.starts_with(&format!("{}/public/summary?key=", server.base_url)));

    let sent = server.sms.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "+15550109999");
    assert!(sent[0].1.contains(&share_url));

    let resp = client
        .post(format!("{}/api/summaries/{}/access-keys", server.base_url, id))
        .json(&json!({ "phoneNumber": "call me", "role": "patient" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Public view, original and translated
    let resp = client.get(&share_url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let view: Value = resp.json().await.unwrap();
    assert_eq!(view["title"], "Discharge after AF admission");
    assert_eq!(view["locale"], "en");
    assert_eq!(view["role"], "patient");
    assert_eq!(view["blocks"].as_array().unwrap().len(), 2);

    assert_eq!(translate(&client, &server, &id, "es").await.status(), 201);
    let resp = client.get(format!("{}&locale=es", share_url)).send().await.unwrap();
    let view: Value = resp.json().await.unwrap();
    assert_eq!(view["locale"], "es");
    assert_eq!(view["blocks"][0]["title"], "ES Your medicines");
    assert_eq!(view["availableLocales"], json!(["en", "es"]));

    let resp = client
        .get(format!("{}/api/summaries/{}/access-keys", server.base_url, id))
        .send()
        .await
        .unwrap();
    let keys: Value = resp.json().await.unwrap();
    assert!(keys[0]["lastAccessedAt"].is_string());
    assert_eq!(keys[0]["shareUrl"], share_url);

    let resp = client
        .get(format!("{}/api/access-keys/{}/qr", server.base_url, key_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/svg+xml");
    assert!(resp.text().await.unwrap().contains("<svg"));

    // Deactivated keys stop working
    let resp = client
        .delete(format!("{}/api/access-keys/{}", server.base_url, key_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    assert_eq!(client.get(&share_url).send().await.unwrap().status(), 401);
    assert_eq!(
        client
            .get(format!("{}/public/summary?key=not-a-key", server.base_url))
            .send()
            .await
            .unwrap()
            .status(),
        401
    );
}

#[tokio::test]
async fn test_status_transitions_and_archiving() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let summary = create_summary(&client, &server).await;
    let id = summary["id"].as_str().unwrap().to_string();
    let status_url = format!("{}/api/summaries/{}/status", server.base_url, id);

    let resp = client
        .post(format!("{}/api/summaries/{}/access-keys", server.base_url, id))
        .json(&json!({ "phoneNumber": "+31612345678", "role": "caregiver" }))
        .send()
        .await
        .unwrap();
    let created: Value = resp.json().await.unwrap();
    assert_eq!(created["smsSent"], false);
    let share_url = created["shareUrl"].as_str().unwrap().to_string();

    let resp = client.put(&status_url).json(&json!({ "status": "published" })).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.put(&status_url).json(&json!({ "status": "draft" })).send().await.unwrap();
    assert_eq!(resp.status(), 400, "published cannot go back to draft");

    let resp = client.put(&status_url).json(&json!({ "status": "archived" })).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    assert_eq!(client.get(&share_url).send().await.unwrap().status(), 404);
    assert_eq!(translate(&client, &server, &id, "fr").await.status(), 400);

    let resp = client
        .get(format!("{}/api/summaries?status=archived", server.base_url))
        .send()
        .await
        .unwrap();
    let archived: Value = resp.json().await.unwrap();
    assert_eq!(archived.as_array().unwrap().len(), 1);

    let resp = client
        .get(format!("{}/api/summaries?status=deleted", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client.put(&status_url).json(&json!({ "status": "draft" })).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(client.get(&share_url).send().await.unwrap().status(), 200);

    let resp = client
        .delete(format!("{}/api/summaries/{}", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    assert_eq!(client.get(&share_url).send().await.unwrap().status(), 401);
}

#[tokio::test]
async fn test_profile_defaults_and_update() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/profile", server.base_url);

    let profile: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(profile["userId"], "dev-user");
    assert_eq!(profile["preferredLocale"], "en");

    let resp = client
        .put(&url)
        .json(&json!({ "displayName": "Dr. Rivera", "preferredLocale": "nl" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .put(&url)
        .json(&json!({ "preferredLocale": "not a locale" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // New summaries default to the profile locale
    let resp = client
        .post(format!("{}/api/summaries", server.base_url))
        .json(&json!({ "dischargeText": DISCHARGE_TEXT }))
        .send()
        .await
        .unwrap();
    let summary: Value = resp.json().await.unwrap();
    assert_eq!(summary["preferredLocale"], "nl");
    assert_eq!(summary["title"], "Discharge summary");
}
