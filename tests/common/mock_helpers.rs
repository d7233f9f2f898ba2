//! Mock construction helpers

use mockall::mock;
use sensor_pipeline::DataSource;

mock! {
    pub Source {}

    impl DataSource for Source {
        fn shutdown(&self);
        fn is_working(&self) -> bool;
    }
}

/// A data source that is idle and expects exactly one shutdown
pub fn idle_source() -> MockSource {
    let mut source = MockSource::new();
    source.expect_is_working().return_const(false);
    source.expect_shutdown().times(1).return_const(());
    source
}
