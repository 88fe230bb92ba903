//! Local asset embedding against a temporary asset root

use avis_poster::embed::AssetEmbedder;
use std::fs;
use tempfile::TempDir;

const LOGO: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

fn asset_root() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("images")).unwrap();
    fs::create_dir_all(dir.path().join("assets/fonts")).unwrap();
    fs::write(dir.path().join("images/logo.png"), LOGO).unwrap();
    fs::write(dir.path().join("assets/fonts/serif.woff2"), b"wOF2").unwrap();
    fs::write(dir.path().join("frame.svg"), b"<svg/>").unwrap();
    dir
}

#[tokio::test]
async fn css_url_is_found_under_images() {
    let root = asset_root();
    let embedder = AssetEmbedder::new(root.path());
    let out = embedder
        .embed_local_assets(".hdr { background: url(logo.png) no-repeat; }")
        .await;
    assert_eq!(
        out,
        ".hdr { background: url(data:image/png;base64,iVBORw0KGgo=) no-repeat; }"
    );
}

#[tokio::test]
async fn quoting_is_preserved() {
    let root = asset_root();
    let embedder = AssetEmbedder::new(root.path());
    let out = embedder
        .embed_local_assets(r#"@font-face { src: url('fonts/serif.woff2') format("woff2"); } a { b: url("frame.svg") }"#)
        .await;
    assert!(out.contains("url('data:font/woff2;base64,"), "{}", out);
    assert!(out.contains(r#"url("data:image/svg+xml;base64,PHN2Zy8+")"#), "{}", out);
}

#[tokio::test]
async fn img_src_is_inlined() {
    let root = asset_root();
    let embedder = AssetEmbedder::new(root.path());
    let out = embedder
        .embed_local_assets(r#"<IMG class="logo" src="/images/logo.png" alt="">"#)
        .await;
    assert_eq!(
        out,
        r#"<IMG class="logo" src="data:image/png;base64,iVBORw0KGgo=" alt="">"#
    );
}

#[tokio::test]
async fn missing_and_external_references_are_untouched() {
    let root = asset_root();
    let embedder = AssetEmbedder::new(root.path());
    let html = concat!(
        "<style>.a{background:url(missing.png)} .b{background:url(https://cdn.example.org/x.png)}</style>",
        r#"<img src="nowhere.jpg"><img src="data:image/gif;base64,R0lGOD">"#,
    );
    assert_eq!(embedder.embed_local_assets(html).await, html);
}

#[tokio::test]
async fn photo_placeholder_is_left_for_substitution() {
    let root = asset_root();
    let embedder = AssetEmbedder::new(root.path());
    let html = r#"<img id="photo" src="{{photo_url}}"><div style="background-image:url({{ photo_url }})"></div>"#;
    assert_eq!(embedder.embed_local_assets(html).await, html);
}

#[tokio::test]
async fn data_src_attribute_is_not_mistaken_for_src() {
    let root = asset_root();
    fs::write(root.path().join("images/lazy.png"), b"lazy").unwrap();
    let embedder = AssetEmbedder::new(root.path());
    let out = embedder
        .embed_local_assets(r#"<img data-src="lazy.png" src="logo.png">"#)
        .await;
    assert_eq!(
        out,
        r#"<img data-src="lazy.png" src="data:image/png;base64,iVBORw0KGgo=">"#
    );
}
