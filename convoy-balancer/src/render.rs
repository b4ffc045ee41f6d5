//! Deterministic rendering to nginx `stream`-module syntax

use convoy_config::ListenerProtocol;

use crate::model::{Listener, StreamConfig, Upstream};

/// Render a configuration to its textual form.
///
/// The output is a pure function of the input. The apply path compares
/// rendered bytes against the last applied bytes, so a no-op regeneration
/// must come out byte-identical.
pub fn render(config: &StreamConfig) -> String {
    let mut out = String::new();
    out.push_str("# Generated by convoy. Do not edit; changes are overwritten.\n");
    out.push_str("stream {\n");
    for upstream in &config.upstreams {
        render_upstream(&mut out, upstream);
    }
    for listener in &config.listeners {
        render_listener(&mut out, listener, config.session_timeout.as_secs());
    }
    out.push_str("}\n");
    out
}

fn render_upstream(out: &mut String, upstream: &Upstream) {
    out.push_str(&format!("    upstream {} {{\n", upstream.name));
    match upstream.protocol {
        // TCP: pick the least-loaded worker, capped at its assigned capacity
        ListenerProtocol::Tcp => out.push_str("        least_conn;\n"),
        // UDP: keep a client's packets on one worker across the upstream
        // list changing underneath it
        ListenerProtocol::Udp => out.push_str("        hash $remote_addr consistent;\n"),
    }
    for server in &upstream.servers {
        if upstream.protocol == ListenerProtocol::Tcp && server.max_conns > 0 {
            out.push_str(&format!(
                "        server {} max_conns={};\n",
                server.endpoint, server.max_conns
            ));
        } else {
            out.push_str(&format!("        server {};\n", server.endpoint));
        }
    }
    out.push_str("    }\n");
}

fn render_listener(out: &mut String, listener: &Listener, timeout_secs: u64) {
    out.push_str("    server {\n");
    match listener.protocol {
        ListenerProtocol::Tcp => out.push_str(&format!("        listen {};\n", listener.port)),
        ListenerProtocol::Udp => out.push_str(&format!("        listen {} udp;\n", listener.port)),
    }
    out.push_str(&format!("        proxy_pass {};\n", listener.upstream));
    out.push_str(&format!("        proxy_timeout {}s;\n", timeout_secs));
    out.push_str("    }\n");
}
