use pwa_offline_proto::*;
use url::Url;

fn key(path: &str) -> RequestKey {
    let url = Url::parse("https://hpr.example/")
        .and_then(|base| base.join(path))
        .expect("valid sample url");
    RequestKey::get(&url)
}

// Entries resembling a freshly installed portfolio cache
pub fn sample_entries() -> Vec<CacheEntry> {
    vec![
        CacheEntry {
            key: key("./"),
            response: ResponseSnapshot::new(200, "<!doctype html><title>Home</title>")
                .with_status_text("OK")
                .with_header("content-type", "text/html; charset=utf-8"),
        },
        CacheEntry {
            key: key("./style.css"),
            response: ResponseSnapshot::new(200, "body { margin: 0 }")
                .with_header("content-type", "text/css"),
        },
        CacheEntry {
            key: key("./icon-192x192.png"),
            response: ResponseSnapshot::new(200, vec![0x89, b'P', b'N', b'G', 0, 0, 0, 13])
                .with_header("content-type", "image/png"),
        },
        CacheEntry {
            key: RequestKey::get(
                &Url::parse("https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0-beta3/css/all.min.css")
                    .expect("valid sample url"),
            ),
            response: ResponseSnapshot::new(200, ".fa{}")
                .with_kind(ResponseKind::Cors)
                .with_header("content-type", "text/css"),
        },
    ]
}
