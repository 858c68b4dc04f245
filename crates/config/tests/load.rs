use app_config::AppConfig;

#[test]
fn test_load_default_config() {
    let cfg = AppConfig::load().unwrap();
    assert_eq!(cfg.db_host, "localhost");
    assert_eq!(cfg.reservation_max_attempts, 3);
    assert_eq!(cfg.outbox_batch_size, 10);
    assert_eq!(
        cfg.compensation_backoff_initial,
        std::time::Duration::from_secs(1)
    );
}
