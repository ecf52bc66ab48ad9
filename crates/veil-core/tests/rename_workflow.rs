use std::fs;
use tempfile::TempDir;
use veil_core::{
    EditSet, NameGenerator, NamingStrategy, ObfuscationConfig, ObfuscationMapping, Span,
};

const SOURCE: &str = "uint256 balance = 1; balance += owner;";

fn rename_all(config: &ObfuscationConfig) -> (String, ObfuscationMapping) {
    let mut names = NameGenerator::for_source(SOURCE, config);
    let balance = names.rename("balance", "v");
    let owner = names.rename("owner", "v");

    let mut edits = EditSet::new();
    edits.replace(Span::new(8, 7), balance.clone());
    edits.replace(Span::new(21, 7), balance);
    edits.replace(Span::new(32, 5), owner);
    let renamed = edits.apply(SOURCE).unwrap();

    let naming = match config.naming {
        NamingStrategy::Counter => "counter",
        NamingStrategy::Hashed => "hashed",
    };
    let mapping = ObfuscationMapping::new(
        names.export_mapping(),
        naming,
        config.hash_salt.clone(),
        config.seed,
    );
    (renamed, mapping)
}

#[test]
fn test_counter_rename_and_restore() {
    let (renamed, mapping) = rename_all(&ObfuscationConfig::default());
    assert_eq!(renamed, "uint256 v0 = 1; v0 += v1;");
    assert_eq!(mapping.deobfuscate(&renamed), SOURCE);
}

#[test]
fn test_config_and_mapping_files() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("veil.json");
    fs::write(
        &config_path,
        r#"{"seed": 42, "naming": "hashed", "hash_salt": "pepper", "passes": {"inline": false}}"#,
    )
    .unwrap();

    let config = ObfuscationConfig::load_from_file(&config_path).unwrap();
    assert_eq!(config.naming, NamingStrategy::Hashed);
    assert!(!config.passes.inline);
    assert!(config.passes.rename);

    let (renamed, mapping) = rename_all(&config);
    assert!(!renamed.contains("balance"));
    assert!(!renamed.contains("owner"));
    assert_eq!(rename_all(&config).0, renamed);

    let mapping_path = temp.path().join("mapping.json");
    mapping.save_to_file(&mapping_path).unwrap();
    let loaded = ObfuscationMapping::load_from_file(&mapping_path).unwrap();
    assert_eq!(loaded.metadata.naming, "hashed");
    assert_eq!(loaded.metadata.hash_salt.as_deref(), Some("pepper"));
    assert_eq!(loaded.metadata.seed, Some(42));
    assert_eq!(loaded.deobfuscate(&renamed), SOURCE);
}

#[test]
fn test_salt_changes_hashed_names() {
    let mut salted = ObfuscationConfig::standard();
    salted.hash_salt = Some("a".to_string());
    let mut other = salted.clone();
    other.hash_salt = Some("b".to_string());
    assert_ne!(rename_all(&salted).0, rename_all(&other).0);
}
