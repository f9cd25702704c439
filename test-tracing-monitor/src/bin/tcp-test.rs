// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of tracing-monitor.
//
// tracing-monitor is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// mpdpopm is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with mpdpopm.  If not,
// see <http://www.gnu.org/licenses/>.

//! Test sending records over TCP to a stand-in agent, then check what arrived.

use tracing::{info, info_span, warn};
use tracing_monitor::{
    backend::QueuedBackend,
    config::{SessionConfig, SinkConfiguration},
    formatter::JsonLines,
    layer::Layer,
    transport::TcpTransport,
};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

use std::io::{BufRead, BufReader};
use std::net::TcpListener;

#[inline(never)]
fn check_out(cart: u64) {
    let span = info_span!("checkout", LogCategory = "Checkout");
    let _enter = span.enter();
    info!(cart, "你好, TCP socket.");
    warn!(cart, "Cart {} is {{still}} open", cart);
}

pub fn main() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let agent = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        BufReader::new(stream)
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(&line.unwrap()).unwrap())
            .collect::<Vec<_>>()
    });

    let backend =
        QueuedBackend::new(JsonLines::default(), TcpTransport::new(addr).unwrap()).unwrap();
    let session = SessionConfig {
        product: Some("tracing-monitor".to_string()),
        application: Some("tcp-test".to_string()),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    };
    let config = SinkConfiguration::builder()
        .category_property("LogCategory")
        .build();
    let subscriber =
        Registry::default().with(Layer::with_session(backend, &session, config).unwrap());
    // Dropping the subscriber ends the session, which closes the connection.
    tracing::subscriber::with_default(subscriber, || check_out(11));

    let received = agent.join().unwrap();
    for envelope in &received {
        println!("{}", envelope);
    }
    let kinds: Vec<&str> = received
        .iter()
        .map(|envelope| envelope["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["session-start", "record", "record", "session-end"]);
    assert_eq!(received[1]["record"]["category"], "Checkout");
    assert_eq!(received[2]["record"]["message"], "Cart 11 is {still} open");
    assert_eq!(received[2]["record"]["call_site"]["method_name"], "check_out");
}
