mod common;

use std::sync::Arc;

use client_log::{set_logger, DefaultLogger, LogBridge, Logger};
use common::SharedBuffer;

#[test]
fn log_crate_records_reach_the_process_logger() {
    LogBridge::init(log::LevelFilter::Trace).unwrap();

    let buffer = SharedBuffer::new();
    let logger = DefaultLogger::new();
    logger.set_output(Box::new(buffer.clone()));
    logger.set_log_level("debug").unwrap();
    set_logger(Arc::new(logger));

    log::info!("query took {}ms", 12);
    log::debug!("alter user set password='hunter2hunter2'");
    log::trace!("too chatty");

    let out = buffer.contents();
    assert!(out.contains("msg=\"query took 12ms\""));
    assert!(out.contains("target=bridge"));
    assert!(out.contains("source=\"tests/bridge.rs:"));
    assert!(!out.contains(" file="));
    assert!(out.contains("password='****"));
    assert!(!out.contains("hunter2"));
    assert!(!out.contains("too chatty"));
}
