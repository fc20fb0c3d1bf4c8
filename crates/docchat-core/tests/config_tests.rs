use docchat_core::config::{resolve_with_base, Config, Settings};
use docchat_core::types::ChunkStrategy;
use figment::Jail;
use std::path::Path;

#[test]
fn defaults_apply_without_any_files() {
    Jail::expect_with(|_jail| {
        let config = Config::load_for_env("test").map_err(|e| e.to_string())?;
        let settings = config.settings().map_err(|e| e.to_string())?;
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.retrieval.min_relevance, 0.1);
        assert_eq!(settings.context.token_budget, 3000);
        Ok(())
    });
}

#[test]
fn files_then_env_override_in_order() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", r#"
            [retrieval]
            top_k = 7
            min_relevance = 0.3

            [chunking]
            default_strategy = "semantic"
        "#)?;
        jail.create_file("config.prod.toml", "[retrieval]\nmin_relevance = 0.05\n")?;
        jail.set_env("APP_CONTEXT__TOKEN_BUDGET", "40");

        let config = Config::load_for_env("prod").map_err(|e| e.to_string())?;
        let settings = config.settings().map_err(|e| e.to_string())?;
        assert_eq!(settings.retrieval.top_k, 7);
        assert_eq!(settings.retrieval.min_relevance, 0.05);
        assert_eq!(settings.context.token_budget, 40);
        assert_eq!(settings.chunking.default_strategy, ChunkStrategy::Semantic);
        assert_eq!(settings.retrieval.semantic_weight, 0.6, "untouched keys keep defaults");
        let top_k: usize = config.get("retrieval.top_k").map_err(|e| e.to_string())?;
        assert_eq!(top_k, 7);
        Ok(())
    });
}

#[test]
fn zero_budget_is_rejected() {
    Jail::expect_with(|jail| {
        jail.set_env("APP_CONTEXT__TOKEN_BUDGET", "0");
        assert!(Config::load_for_env("dev").is_err());
        Ok(())
    });
}

#[test]
fn semantic_threshold_must_sit_above_the_relaxed_one() {
    Jail::expect_with(|jail| {
        assert_eq!(Settings::default().retrieval.semantic_threshold, 0.05);
        jail.set_env("APP_RETRIEVAL__SEMANTIC_THRESHOLD", "0.0");
        assert!(Config::load_for_env("dev").is_err());
        Ok(())
    });
}

#[test]
fn relative_paths_resolve_against_base() {
    let base = Path::new("/srv/docchat");
    assert_eq!(resolve_with_base(base, "data/store"), base.join("data/store"));
    assert_eq!(resolve_with_base(base, "/var/lib/store"), Path::new("/var/lib/store"));
}
