use ember_core::{Error, FrameArenas, RendererConfig};

#[test]
fn test_load_config_from_file() {
    let path = std::env::temp_dir().join(format!("ember-config-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        "app_name = \"from-file\"\nframe_arena_size = 4096\nmax_listener_count = 1\n",
    )
    .unwrap();

    let config = RendererConfig::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.app_name, "from-file");
    assert_eq!(config.frame_arena_size, 4096);
    assert_eq!(config.max_listener_count, 1);
    assert_eq!(config.swap_chain_arena_size, ember_core::DEFAULT_ARENA_SIZE);
}

#[test]
fn test_load_missing_file_is_io_error() {
    let path = std::env::temp_dir().join("ember-config-does-not-exist.toml");
    assert!(matches!(RendererConfig::load(&path), Err(Error::Io(_))));
}

#[test]
fn test_arenas_follow_config_sizes() {
    let config = RendererConfig {
        frame_arena_size: 128,
        persistent_arena_size: 64,
        swap_chain_arena_size: 32,
        ..Default::default()
    };
    let mut arenas = FrameArenas::from_config(&config);

    assert_eq!(arenas.frame().max_content_size(), 128);
    assert_eq!(arenas.persistent().max_content_size(), 64);
    assert_eq!(arenas.swap_chain().max_content_size(), 32);

    assert!(arenas.swap_chain().reserve(33).is_err());
    arenas.swap_chain().reserve(32).unwrap();
    arenas.end_swap_chain();
    arenas.swap_chain().reserve(32).unwrap();
}
