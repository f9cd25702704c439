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

//! Test sending records to an agent on port 4520 on the local host.

use tracing::{debug, error, info, trace, warn};
use tracing_monitor::{
    backend::QueuedBackend, config::SinkConfiguration, formatter::JsonLines, layer::Layer,
    transport::UdpTransport,
};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

pub fn main() {
    let backend =
        QueuedBackend::new(JsonLines::default(), UdpTransport::local().unwrap()).unwrap();
    // Setup the real subsriber...
    let subscriber = Registry::default().with(Layer::new(backend, SinkConfiguration::default()));
    // and install it.
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!("Hello, 世界!");
    debug!("Hello, 世界!");
    info!("Hello, 世界!");
    warn!("Hello, 世界!");
    error!("Hello, 世界!");
}
