//! A device-style HTTP server demonstrating the asyncweb-rs server API.
//!
//! Run with `RUST_LOG=debug cargo run --example http_server` and try:
//!
//! ```text
//! curl http://127.0.0.1:8080/
//! curl http://127.0.0.1:8080/hello?name=Ada
//! curl http://127.0.0.1:8080/sensor/3
//! curl -u admin:admin http://127.0.0.1:8080/admin
//! curl -F fw=@Cargo.toml http://127.0.0.1:8080/update
//! curl http://127.0.0.1:8080/count
//! ```

use std::cell::Cell;
use std::rc::Rc;

use asyncweb_rs::server::{CallbackHandler, Fill, UploadChunk};
use asyncweb_rs::{HttpResponse, HttpServer, Methods, ServerConfig, StatusCode};
use serde::Serialize;

#[derive(Serialize)]
struct Reading {
    sensor: u32,
    celsius: f32,
}

const INDEX: &str = "<html><body><h1>%DEVICE%</h1><p>Uptime: %UPTIME% requests</p></body></html>";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Create a server configuration
    let config = ServerConfig {
        addr: "127.0.0.1:8080".parse()?,
        ..ServerConfig::default()
    }
    .with_default_header("Server", "asyncweb-rs");

    // Create a new HTTP server
    let mut server = HttpServer::new(config);
    let served = Rc::new(Cell::new(0u32));

    // 1. Templated landing page, also reachable as "/"
    server.rewrite("/", "/index.html");
    let counter = served.clone();
    server.on("/index.html", Methods::GET, move |req| {
        counter.set(counter.get() + 1);
        let uptime = counter.get();
        req.send(
            HttpResponse::new(StatusCode::Ok)
                .with_content_type("text/html")
                .with_body_string(INDEX)
                .with_template(move |name| match name {
                    "DEVICE" => "asyncweb demo".to_string(),
                    "UPTIME" => uptime.to_string(),
                    _ => String::new(),
                }),
        );
    });

    // 2. Query parameters
    server.on("/hello", Methods::GET, |req| {
        let name = req.arg("name").unwrap_or("World").to_string();
        req.send_text(StatusCode::Ok, "text/plain", format!("Hello, {name}!"));
    });

    // 3. Path arguments and JSON
    server.on_regex(r"^/sensor/(\d+)$", Methods::GET, |req| {
        let Some(sensor) = req.path_arg(0).and_then(|s| s.parse().ok()) else {
            return req.send_status(StatusCode::BadRequest);
        };
        let reading = Reading {
            sensor,
            celsius: 20.0 + sensor as f32 / 10.0,
        };
        match HttpResponse::new(StatusCode::Ok).with_json(&reading) {
            Ok(response) => req.send(response),
            Err(_) => req.send_status(StatusCode::InternalServerError),
        }
    })?;

    // 4. Basic authentication
    server
        .on("/admin", Methods::GET, |req| {
            req.send_text(StatusCode::Ok, "text/plain", "Welcome, administrator");
        })
        .set_authentication("admin", "admin");

    // 5. Streaming upload: count bytes without buffering the file
    server.add_handler(
        CallbackHandler::new("/update", Methods::POST, |req| {
            let received = req.take_user_data::<usize>().unwrap_or(0);
            req.send_text(StatusCode::Ok, "text/plain", format!("Received {received} bytes"));
        })
        .with_upload(|req, chunk: &UploadChunk<'_>| {
            if chunk.index == 0 {
                req.set_user_data(0usize);
            }
            if let Some(total) = req.user_data_mut::<usize>() {
                *total += chunk.data.len();
            }
        }),
    );

    // 6. Chunked response produced on demand
    server.on("/count", Methods::GET, |req| {
        let mut next = 1u32;
        req.send(HttpResponse::chunked("text/plain", move |buf: &mut [u8], _index: usize| {
            if next > 10 {
                return Fill::Ready(0);
            }
            let line = format!("{next}\n");
            next += 1;
            let n = line.len().min(buf.len());
            buf[..n].copy_from_slice(&line.as_bytes()[..n]);
            Fill::Ready(n)
        }));
    });

    server.on_not_found(|req| {
        let url = req.url().to_string();
        req.send_text(StatusCode::NotFound, "text/plain", format!("Nothing at {url}"));
    });

    // Start the server
    server.start().await?;

    Ok(())
}
