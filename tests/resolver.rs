//! Image resolver against a local HTTP server

use avis_poster::{ImageResolver, PosterConfig};
use std::time::{Duration, Instant};
use tiny_http::{Header, Response, Server};

const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3, 4];

fn content_type(value: &str) -> Header {
    Header::from_bytes(&b"Content-Type"[..], value.as_bytes()).unwrap()
}

/// Serve a small fixture site on an ephemeral port and return its base URL.
fn start_fixture_server() -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();

    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            std::thread::spawn(move || {
                let path = request.url().to_string();
                let response = match path.as_str() {
                    "/photo.png" => Response::from_data(PNG_BYTES.to_vec())
                        .with_header(content_type("image/png")),
                    "/portrait.jpg" => Response::from_data(vec![0xff, 0xd8, 0xff, 0xe0])
                        .with_header(content_type("image/jpeg; charset=binary")),
                    "/page.html" => Response::from_string(
                        r#"<html><head><meta property="og:image" content="/photo.png"></head><body></body></html>"#,
                    )
                    .with_header(content_type("text/html; charset=utf-8")),
                    "/gallery/index.html" => Response::from_string(
                        r#"<html><body><img src="spacer"><img src="../portrait.jpg"></body></html>"#,
                    )
                    .with_header(content_type("text/html")),
                    "/chain.html" => Response::from_string(
                        r#"<html><head><meta property="og:image" content="/page.html"></head></html>"#,
                    )
                    .with_header(content_type("text/html")),
                    "/empty.html" => Response::from_string("<html><body>No photo</body></html>")
                        .with_header(content_type("text/html")),
                    "/notes.txt" => Response::from_string("plain text")
                        .with_header(content_type("text/plain")),
                    "/slow.png" => {
                        std::thread::sleep(Duration::from_secs(3));
                        Response::from_data(PNG_BYTES.to_vec()).with_header(content_type("image/png"))
                    }
                    _ => Response::from_string("Not Found")
                        .with_status_code(404)
                        .with_header(content_type("image/png")),
                };
                let _ = request.respond(response);
            });
        }
    });

    format!("http://{}", addr)
}

fn resolver() -> ImageResolver {
    let config = PosterConfig {
        fetch_timeout: Duration::from_millis(500),
        ..Default::default()
    };
    ImageResolver::new(&config).expect("resolver")
}

#[tokio::test]
async fn image_response_becomes_data_uri() {
    let base = start_fixture_server();
    let image = resolver()
        .resolve(Some(&format!("{}/photo.png", base)))
        .await
        .expect("image");
    assert_eq!(image.mime, "image/png");
    assert_eq!(image.data, PNG_BYTES);
    assert!(image.data_uri().starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn content_type_parameters_are_dropped() {
    let base = start_fixture_server();
    let image = resolver()
        .resolve(Some(&format!("{}/portrait.jpg", base)))
        .await
        .expect("image");
    assert!(image.data_uri().starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn og_image_page_is_followed_once() {
    let base = start_fixture_server();
    let image = resolver()
        .resolve(Some(&format!("{}/page.html", base)))
        .await
        .expect("image behind og:image");
    assert_eq!(image.mime, "image/png");
    assert_eq!(image.data, PNG_BYTES);
}

#[tokio::test]
async fn relative_img_src_is_resolved_against_page() {
    let base = start_fixture_server();
    let image = resolver()
        .resolve(Some(&format!("{}/gallery/index.html", base)))
        .await
        .expect("image from <img>");
    assert_eq!(image.mime, "image/jpeg");
}

#[tokio::test]
async fn two_chained_pages_exceed_the_hop_budget() {
    let base = start_fixture_server();
    let resolver = resolver();
    assert!(resolver
        .resolve(Some(&format!("{}/chain.html", base)))
        .await
        .is_none());
    assert!(resolver
        .resolve_at_depth(&format!("{}/photo.png", base), 2)
        .await
        .is_none());
}

#[tokio::test]
async fn unusable_responses_resolve_to_none() {
    let base = start_fixture_server();
    let resolver = resolver();
    for path in ["/empty.html", "/notes.txt", "/nope.png"] {
        assert!(
            resolver.resolve(Some(&format!("{}{}", base, path))).await.is_none(),
            "{} should not resolve",
            path
        );
    }
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let base = start_fixture_server();
    let config = PosterConfig {
        max_image_bytes: 4,
        ..Default::default()
    };
    let resolver = ImageResolver::new(&config).unwrap();
    assert!(resolver
        .resolve(Some(&format!("{}/photo.png", base)))
        .await
        .is_none());
}

#[tokio::test]
async fn slow_host_gives_up_within_timeout() {
    let base = start_fixture_server();
    let started = Instant::now();
    let res = resolver().resolve(Some(&format!("{}/slow.png", base))).await;
    assert!(res.is_none());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn unreachable_host_resolves_to_none() {
    // Bind then drop to get a port nobody listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let started = Instant::now();
    let res = resolver()
        .resolve(Some(&format!("http://127.0.0.1:{}/photo.png", port)))
        .await;
    assert!(res.is_none());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(resolver().resolve(Some("not a url")).await.is_none());
}
