//! Helpers shared by tests that need image bytes or an HTTP origin.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub(crate) fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 120, 200]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Minimal HTTP/1.1 responder: `/fail` answers 404, `/flaky` answers 503
/// on its first hit, `/down...` always answers 503, everything else gets a
/// small PNG.
pub(crate) async fn serve(hits: Arc<AtomicUsize>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let flaky_seen = Arc::new(AtomicUsize::new(0));
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            let hits = hits.clone();
            let flaky_seen = flaky_seen.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                hits.fetch_add(1, Ordering::SeqCst);
                let (status, body) = if path == "/fail" {
                    ("404 Not Found", Vec::new())
                } else if path.starts_with("/down") {
                    ("503 Service Unavailable", Vec::new())
                } else if path == "/flaky" && flaky_seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    ("503 Service Unavailable", Vec::new())
                } else {
                    ("200 OK", png_bytes())
                };
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{}", addr)
}
