// End-to-end tests for the HTTP surface over a real TCP listener.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use evaluation_server::config::StorageConfig;
use evaluation_server::http::{build_router, AppContext};
use evaluation_server::llm::config::LlmConfigStore;
use evaluation_server::store::EvaluationStore;

fn crate_default(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("defaults").join(name)
}

/// Serve the API on an ephemeral port with a fresh temp-dir data file.
/// Returns the temp dir (kept alive), the bound address, and the data file
/// path for direct on-disk assertions.
async fn spawn_server() -> (TempDir, SocketAddr, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let data_file = tmp.path().join("bid-evaluation.json");

    let storage = StorageConfig {
        data_file: data_file.to_string_lossy().into_owned(),
        template_file: crate_default("bid-evaluation-template.json")
            .to_string_lossy()
            .into_owned(),
        default_values_file: crate_default("default-values.json")
            .to_string_lossy()
            .into_owned(),
    };
    let store = EvaluationStore::open(&storage).unwrap();

    let ctx = Arc::new(AppContext {
        store,
        llm_config: LlmConfigStore::new(tmp.path().join("llm.toml")),
        http: reqwest::Client::new(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(ctx)).await.unwrap();
    });

    (tmp, addr, data_file)
}

fn sample_document() -> Value {
    json!({
        "bid_id": "bid-42",
        "tender_id": "tender-9",
        "current_selected_criteria": "1",
        "current_selected_bidder": "Shraddha",
        "current_pdf_page": 336,
        "criterias": {
            "1": {
                "metadata": {
                    "tables": {
                        "table-1-Shraddha": {
                            "cells": {
                                "turnover-2019-20": {
                                    "value": "3110.00",
                                    "page_number": 336,
                                    "metadata": {
                                        "modified_by": "human",
                                        "modified_at": "2024-03-01T09:00:00Z"
                                    }
                                }
                            }
                        }
                    }
                }
            }
        },
        "bookmarked_pages": [{"page": 12, "label": "EMD receipt"}],
        "chat_messages": [{"role": "user", "content": "check turnover"}],
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z"
    })
}

#[tokio::test]
async fn get_without_document_returns_500() {
    let (_tmp, addr, _data) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/api/bid-evaluation"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Failed to read evaluation data" }));
}

#[tokio::test]
async fn put_then_get_round_trips_with_fresh_updated_at() {
    let (_tmp, addr, _data) = spawn_server().await;
    let client = reqwest::Client::new();
    let doc = sample_document();

    let resp = client
        .put(format!("http://{addr}/api/bid-evaluation"))
        .json(&doc)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], json!(true));
    let written = &body["data"];
    assert_eq!(written["bid_id"], doc["bid_id"]);
    assert_eq!(written["criterias"], doc["criterias"]);
    assert_eq!(written["created_at"], doc["created_at"]);
    assert_ne!(written["updated_at"], doc["updated_at"]);

    let fetched: Value = client
        .get(format!("http://{addr}/api/bid-evaluation"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(&fetched, written);
}

#[tokio::test]
async fn reset_action_installs_template() {
    let (_tmp, addr, _data) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/bid-evaluation"))
        .json(&json!({ "action": "reset" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["message"], json!("Evaluation data reset to template"));

    let doc: Value = client
        .get(format!("http://{addr}/api/bid-evaluation"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(doc["bid_id"], json!(""));
    assert_eq!(doc["criterias"], json!({}));
    // Both timestamps are stamped from one instant at reset.
    assert_eq!(doc["created_at"], doc["updated_at"]);
}

#[tokio::test]
async fn reset_to_default_builds_partner_tables() {
    let (_tmp, addr, _data) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/bid-evaluation"))
        .json(&json!({ "action": "resetToDefault" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["message"],
        json!("Evaluation data reset to default correct values")
    );

    let doc: Value = client
        .get(format!("http://{addr}/api/bid-evaluation"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let tables = doc["criterias"]["1"]["metadata"]["tables"]
        .as_object()
        .unwrap();
    for name in [
        "table-1-Abhiraj",
        "table-1-Shraddha",
        "table-1-Shankar",
        "table-1-J.V.",
    ] {
        let cells = tables[name]["cells"].as_object().unwrap();
        assert_eq!(cells.len(), 5, "table {name} should have 5 cells");
        for cell in cells.values() {
            assert_eq!(cell["metadata"]["modified_by"], json!("AI"));
        }
    }
    assert_eq!(tables.len(), 4);
    assert_eq!(
        tables["table-1-Abhiraj"]["cells"]["turnover-2020-21"]["value"],
        json!("5956.07")
    );

    // No prior document: identity and history fields are empty defaults.
    assert_eq!(doc["bid_id"], json!(""));
    assert_eq!(doc["tender_id"], json!(""));
    assert_eq!(doc["bookmarked_pages"], json!([]));
    assert_eq!(doc["chat_messages"], json!([]));
}

#[tokio::test]
async fn reset_to_default_preserves_prior_identity() {
    let (_tmp, addr, _data) = spawn_server().await;
    let client = reqwest::Client::new();
    let doc = sample_document();

    client
        .put(format!("http://{addr}/api/bid-evaluation"))
        .json(&doc)
        .send()
        .await
        .unwrap();

    client
        .post(format!("http://{addr}/api/bid-evaluation"))
        .json(&json!({ "action": "resetToDefault" }))
        .send()
        .await
        .unwrap();

    let after: Value = client
        .get(format!("http://{addr}/api/bid-evaluation"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(after["bid_id"], doc["bid_id"]);
    assert_eq!(after["tender_id"], doc["tender_id"]);
    assert_eq!(after["bookmarked_pages"], doc["bookmarked_pages"]);
    assert_eq!(after["chat_messages"], doc["chat_messages"]);
    assert_eq!(after["created_at"], doc["created_at"]);
    // Table values come from the fixture, replacing the human edit.
    assert_eq!(
        after["criterias"]["1"]["metadata"]["tables"]["table-1-Shraddha"]["cells"]
            ["turnover-2019-20"]["metadata"]["modified_by"],
        json!("AI")
    );
}

#[tokio::test]
async fn unknown_action_is_400_and_leaves_store_untouched() {
    let (_tmp, addr, data_file) = spawn_server().await;
    let client = reqwest::Client::new();

    client
        .put(format!("http://{addr}/api/bid-evaluation"))
        .json(&sample_document())
        .send()
        .await
        .unwrap();
    let before = std::fs::read_to_string(&data_file).unwrap();

    let resp = client
        .post(format!("http://{addr}/api/bid-evaluation"))
        .json(&json!({ "action": "bogus" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Invalid action" }));

    let after = std::fs::read_to_string(&data_file).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn missing_action_is_400() {
    let (_tmp, addr, _data) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/bid-evaluation"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contended_puts_always_leave_one_full_document() {
    use std::sync::atomic::{AtomicBool, Ordering};

    let (_tmp, addr, data_file) = spawn_server().await;

    // One wide document and one narrow one: if two writes ever interleave
    // on disk, the narrow serialization ends up with the wide one's tail
    // and stops parsing.
    let mut wide = sample_document();
    wide["bid_id"] = json!("bid-wide");
    wide["chat_messages"] = json!([{ "role": "user", "content": "A".repeat(128 * 1024) }]);
    let mut narrow = sample_document();
    narrow["bid_id"] = json!("bid-narrow");

    // Seed so the observer always has a file to read.
    let seed = reqwest::Client::new()
        .put(format!("http://{addr}/api/bid-evaluation"))
        .json(&narrow)
        .send()
        .await
        .unwrap();
    assert_eq!(seed.status(), 200);

    let done = Arc::new(AtomicBool::new(false));
    let observer = {
        let data_file = data_file.clone();
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                let text = std::fs::read_to_string(&data_file).unwrap();
                let on_disk: Value =
                    serde_json::from_str(&text).expect("live file must always parse");
                let id = on_disk["bid_id"].as_str().unwrap();
                assert!(id == "bid-wide" || id == "bid-narrow", "unexpected bid_id {id}");
            }
        })
    };

    let writers: Vec<_> = (0..4)
        .map(|i| {
            let doc = if i % 2 == 0 { wide.clone() } else { narrow.clone() };
            let url = format!("http://{addr}/api/bid-evaluation");
            tokio::spawn(async move {
                let client = reqwest::Client::new();
                for _ in 0..25 {
                    let resp = client.put(&url).json(&doc).send().await.unwrap();
                    assert_eq!(resp.status(), 200);
                }
            })
        })
        .collect();

    for w in writers {
        w.await.unwrap();
    }
    done.store(true, Ordering::Relaxed);
    observer.join().unwrap();
}

#[tokio::test]
async fn llm_config_round_trips() {
    let (_tmp, addr, _data) = spawn_server().await;
    let client = reqwest::Client::new();

    let initial: Value = client
        .get(format!("http://{addr}/api/llm-config"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(initial["provider"], json!("cdac"));
    assert_eq!(initial["cdac_api_key"], json!(""));

    let resp = client
        .put(format!("http://{addr}/api/llm-config"))
        .json(&json!({
            "provider": "gemini",
            "cdac_api_key": "",
            "gemini_api_key": "gk-123"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let saved: Value = client
        .get(format!("http://{addr}/api/llm-config"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(saved["provider"], json!("gemini"));
    assert_eq!(saved["gemini_api_key"], json!("gk-123"));
}

#[tokio::test]
async fn generate_without_configured_provider_is_400() {
    let (_tmp, addr, _data) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/llm/generate"))
        .json(&json!({ "prompt": "extract the turnover" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "detail": "LLM provider not configured" }));
}
