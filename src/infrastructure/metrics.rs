//! Prometheus metrics

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus exporter with an HTTP listener on `listen`
pub fn init_metrics(listen: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(listen).install()?;

    describe_counter!("sms_sent_total", "Outbound SMS confirmed by the provider");
    describe_counter!("sms_send_failures_total", "Outbound SMS rejected or not delivered to the provider");
    describe_counter!("calls_initiated_total", "Outbound calls accepted by the provider");
    describe_counter!("realtime_reconnects_total", "Push channel reconnect attempts");
    describe_counter!("realtime_events_dropped_total", "Malformed push frames dropped");
    describe_counter!("realtime_polls_total", "Polling backstop runs");
    describe_gauge!("realtime_channel_connected", "1 while the push channel is connected");

    Ok(())
}

pub fn record_sms_sent() {
    counter!("sms_sent_total").increment(1);
}

pub fn record_sms_failed() {
    counter!("sms_send_failures_total").increment(1);
}

pub fn record_call_initiated() {
    counter!("calls_initiated_total").increment(1);
}

pub fn record_reconnect() {
    counter!("realtime_reconnects_total").increment(1);
}

pub fn record_dropped_event() {
    counter!("realtime_events_dropped_total").increment(1);
}

pub fn record_poll(ok: bool) {
    counter!("realtime_polls_total", "outcome" => if ok { "ok" } else { "error" }).increment(1);
}

pub fn set_channel_connected(connected: bool) {
    gauge!("realtime_channel_connected").set(if connected { 1.0 } else { 0.0 });
}
