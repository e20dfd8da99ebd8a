use gitory_core::{open_manager, BootstrapError, ConfigError, CoreConfig, GitHosting, Repository};

#[test]
fn open_manager_wires_file_store_and_hosting_root() {
    let dir = tempfile::tempdir().unwrap();
    let config = CoreConfig::new(
        dir.path().join("private/gitory.db"),
        dir.path().join("repositories"),
    );

    {
        let manager = open_manager(&config).unwrap();
        manager
            .save(&Repository::new("proj-a", "Proj A").unwrap())
            .unwrap();
    }

    let reopened = open_manager(&config).unwrap();
    let loaded = reopened.find_by_identifier("proj-a").unwrap();
    assert_eq!(loaded.path, Some(dir.path().join("repositories/proj-a")));
    assert!(reopened.hosting().exists(&loaded.identifier));
    assert!(reopened.reconcile().unwrap().is_empty());
}

#[test]
fn open_manager_supports_in_memory_storage() {
    let dir = tempfile::tempdir().unwrap();
    let config = CoreConfig::from_toml_str(&format!(
        "storageLocation = \":memory:\"\nhostingRootPath = {:?}\nhostingTimeoutMs = 5000\n",
        dir.path().join("repos").display().to_string()
    ))
    .unwrap();

    let manager = open_manager(&config).unwrap();
    manager
        .save(&Repository::new("proj-a", "Proj A").unwrap())
        .unwrap();
    assert_eq!(manager.find_all().unwrap().len(), 1);
}

#[test]
fn open_manager_rejects_invalid_config() {
    let config = CoreConfig::new(":memory:", "");
    let err = open_manager(&config).err().expect("empty hosting root must fail");
    assert!(matches!(err, BootstrapError::Config(ConfigError::Invalid(_))));
}
