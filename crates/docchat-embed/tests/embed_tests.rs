use docchat_core::config::EmbeddingSettings;
use docchat_core::traits::EmbedProvider;
use docchat_embed::http::parse_embeddings;
use docchat_embed::{provider_from_settings, HashEmbedder};
use serde_json::json;

fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

#[tokio::test]
async fn hash_embeddings_are_deterministic_and_normalized() {
    let e = HashEmbedder::new(64);
    assert_eq!(e.embedder_id(), "hash:xxh64:d64");
    let a = e.embed("Pump pressure is low").await.unwrap();
    let b = e.embed("pump PRESSURE is low").await.unwrap();
    assert_eq!(a.len(), 64);
    assert_eq!(a, b);
    let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn shared_vocabulary_scores_closer() {
    let e = HashEmbedder::new(256);
    let v = e.embed_batch(&["pump pressure valve".into(), "pump pressure gauge".into(), "zebra migration season".into()]).await.unwrap();
    assert!(cosine(&v[0], &v[1]) > cosine(&v[0], &v[2]));
}

#[test]
fn openai_style_payload_is_parsed() {
    let json = json!({ "data": [ { "embedding": [3.0, 4.0] }, { "embedding": [0.0, 2.0] } ] });
    let v = parse_embeddings(&json, 2, 2).unwrap();
    assert!((v[0][0] - 0.6).abs() < 1e-6 && (v[0][1] - 0.8).abs() < 1e-6);
    assert_eq!(v[1], vec![0.0, 1.0]);
    assert!(parse_embeddings(&json, 3, 2).is_err());
    assert!(parse_embeddings(&json, 2, 3).is_err());
    assert!(parse_embeddings(&json!({"error": "x"}), 1, 2).is_err());
}

#[test]
fn unknown_provider_is_rejected() {
    let settings = EmbeddingSettings { provider: "nope".into(), ..EmbeddingSettings::default() };
    assert!(provider_from_settings(&settings).is_err());
    let hash = provider_from_settings(&EmbeddingSettings::default()).unwrap();
    assert_eq!(hash.dim(), 384);
}
