//! Weapon image discovery and download.
//!
//! Images are located in the section that follows a weapon's heading, fetched
//! once into `by_game/<game>/` and mirrored into `by_weapon/<weapon>/`.

use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::document::heading_text;
use crate::fetcher::{FetchOptions, fetch_bytes};
use crate::models::WeaponRecord;

pub const IMFDB_BASE: &str = "https://www.imfdb.org";
/// Downloads smaller than this are treated as error pages and discarded.
pub const MIN_IMAGE_BYTES: usize = 1024;
pub const IMAGE_REPORT_FILE: &str = "image_report.txt";

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];
const MAX_FILENAME_LEN: usize = 100;

static THUMB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/thumb/(.+)/\d+px-[^/]+$").expect("static regex"));
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("static regex"));
static SEPARATOR_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[_\s]+").expect("static regex"));

/// Absolute URL of the full-size image behind `raw`.
pub fn resolve_image_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }
    let base = Url::parse(IMFDB_BASE).ok()?;
    let url = base.join(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    Some(THUMB.replace(url.as_str(), "/$1").into_owned())
}

fn looks_like_image(href: &str) -> bool {
    let lower = href.to_lowercase();
    // MediaWiki "File:" links lead to description pages, not image bytes
    !lower.contains("/file:") && IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext))
}

fn is_section_break(el: &ElementRef) -> bool {
    matches!(el.value().name(), "h2" | "h3" | "h4")
}

/// Image URLs in the section under the weapon heading named `toc_name`.
pub fn find_weapon_images(html: &str, toc_name: &str) -> Vec<String> {
    let wanted = toc_name.trim().to_lowercase();
    if wanted.is_empty() {
        return Vec::new();
    }
    let (Ok(heading_sel), Ok(media_sel)) = (
        Selector::parse("h3, h4"),
        Selector::parse("img, a[href]"),
    ) else {
        return Vec::new();
    };
    let page = Html::parse_document(html);

    let headings: Vec<ElementRef> = page.select(&heading_sel).collect();
    let heading = headings
        .iter()
        .find(|h| heading_text(h).to_lowercase() == wanted)
        .or_else(|| {
            headings
                .iter()
                .find(|h| heading_text(h).to_lowercase().contains(&wanted))
        });
    let Some(heading) = heading else {
        debug!(weapon = %toc_name, "no heading found");
        return Vec::new();
    };

    let mut urls: Vec<String> = Vec::new();
    for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
        if is_section_break(&sibling) {
            break;
        }
        let candidates = std::iter::once(sibling).chain(sibling.select(&media_sel));
        for el in candidates {
            let v = el.value();
            let raw = match v.name() {
                "img" => v.attr("src").or_else(|| v.attr("data-src")),
                "a" => v.attr("href").filter(|h| looks_like_image(h)),
                _ => None,
            };
            if let Some(url) = raw.and_then(resolve_image_url)
                && !urls.contains(&url)
            {
                urls.push(url);
            }
        }
    }
    debug!(weapon = %toc_name, images = urls.len(), "found images");
    urls
}

/// File-system safe form of `name`.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(name, "_");
    let collapsed = SEPARATOR_RUNS.replace_all(&replaced, "_");
    let truncated: String = collapsed.chars().take(MAX_FILENAME_LEN).collect();
    let trimmed = truncated.trim_matches('_');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Image extension found in the URL path, `.jpg` when none is recognised.
pub fn file_extension(url: &str) -> &'static str {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());
    IMAGE_EXTENSIONS
        .iter()
        .find(|ext| path.contains(*ext))
        .copied()
        .unwrap_or(".jpg")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageStats {
    pub processed: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_bytes: u64,
}

impl ImageStats {
    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.downloaded as f64 / self.processed as f64 * 100.0
        }
    }

    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0)
    }
}

pub fn render_image_report(stats: &ImageStats, root: &Path) -> String {
    let rule = "=".repeat(60);
    let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "IMAGE SCRAPING REPORT");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Total images processed: {}", stats.processed);
    let _ = writeln!(out, "Successful downloads: {}", stats.downloaded);
    let _ = writeln!(out, "Failed downloads: {}", stats.failed);
    let _ = writeln!(out, "Skipped (already exists): {}", stats.skipped);
    let _ = writeln!(out, "Success rate: {:.1}%", stats.success_rate());
    let _ = writeln!(out, "Total size: {:.2} MB", stats.total_mb());
    let _ = writeln!(out);
    let _ = writeln!(out, "Images saved to: {}", root.display());
    let _ = writeln!(out, "{rule}");
    out
}

pub struct ImageDownloader {
    client: Client,
    root: PathBuf,
    options: FetchOptions,
    delay: Duration,
    stats: ImageStats,
}

impl ImageDownloader {
    pub fn new(client: Client, root: impl Into<PathBuf>, options: FetchOptions, delay: Duration) -> Self {
        Self {
            client,
            root: root.into(),
            options,
            delay,
            stats: ImageStats::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> ImageStats {
        self.stats
    }

    /// Download `urls` for one record. Returns the game-directory paths.
    /// Filesystem errors are logged and counted as failed images.
    pub async fn download_weapon_images(&mut self, record: &WeaponRecord, urls: &[String]) -> Vec<PathBuf> {
        let game = sanitize_filename(&record.game);
        let weapon = sanitize_filename(record.display_name());
        let game_dir = self.root.join("by_game").join(&game);
        let weapon_dir = self.root.join("by_weapon").join(&weapon);
        for dir in [&game_dir, &weapon_dir] {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!(dir = %dir.display(), error = %e, "cannot create image directory");
                self.stats.processed += urls.len();
                self.stats.failed += urls.len();
                return Vec::new();
            }
        }

        let mut saved = Vec::new();
        for (idx, url) in urls.iter().enumerate() {
            self.stats.processed += 1;
            let filename = format!("{weapon}_{}{}", idx + 1, file_extension(url));
            let game_path = game_dir.join(&filename);

            if tokio::fs::try_exists(&game_path).await.unwrap_or(false) {
                debug!(file = %filename, "image already exists");
                self.stats.skipped += 1;
                saved.push(game_path);
                continue;
            }

            match fetch_bytes(&self.client, url, &self.options, None).await {
                Ok(bytes) if bytes.len() < MIN_IMAGE_BYTES => {
                    warn!(url = %url, bytes = bytes.len(), "image too small, discarded");
                    self.stats.failed += 1;
                }
                Ok(bytes) => match tokio::fs::write(&game_path, &bytes).await {
                    Ok(()) => {
                        if let Err(e) = tokio::fs::copy(&game_path, weapon_dir.join(&filename)).await {
                            warn!(file = %filename, error = %e, "failed to mirror image");
                        }
                        self.stats.downloaded += 1;
                        self.stats.total_bytes += bytes.len() as u64;
                        info!(file = %filename, kb = bytes.len() / 1024, "downloaded image");
                        saved.push(game_path);
                    }
                    Err(e) => {
                        warn!(file = %game_path.display(), error = %e, "failed to save image");
                        self.stats.failed += 1;
                    }
                },
                Err(e) => {
                    warn!(url = %url, error = %e, "image download failed");
                    self.stats.failed += 1;
                }
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
        saved
    }

    /// Download images for every record whose game page is in `pages`.
    /// Keys of the result are `game|toc_name`.
    pub async fn download_all(
        &mut self,
        records: &[WeaponRecord],
        pages: &BTreeMap<String, String>,
    ) -> BTreeMap<String, Vec<PathBuf>> {
        info!(weapons = records.len(), "starting image scraping");
        let mut out = BTreeMap::new();
        for record in records {
            if record.game.is_empty() || record.toc_name.is_empty() {
                continue;
            }
            let Some(html) = pages.get(&record.game) else {
                warn!(game = %record.game, "no page for game");
                continue;
            };
            let urls = find_weapon_images(html, &record.toc_name);
            if urls.is_empty() {
                continue;
            }
            let saved = self.download_weapon_images(record, &urls).await;
            out.insert(format!("{}|{}", record.game, record.toc_name), saved);
        }
        info!(downloaded = self.stats.downloaded, "image scraping complete");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const PAGE: &str = r#"
        <h2><span class="mw-headline">Pistols</span></h2>
        <h3><span class="mw-headline">Glock 17</span></h3>
        <div class="thumb">
          <a href="/wiki/File:Glock17.jpg" class="image">
            <img src="/images/thumb/a/ab/Glock17.jpg/300px-Glock17.jpg">
          </a>
        </div>
        <p>Text <img data-src="//www.imfdb.org/images/c/cd/Glock_side.png"></p>
        <table><tr><td><img src="/images/thumb/a/ab/Glock17.jpg/300px-Glock17.jpg"></td></tr></table>
        <h3><span class="mw-headline">Colt M1911</span></h3>
        <div><img src="/images/e/ef/M1911.jpg"></div>
    "#;

    #[test]
    fn images_come_from_the_weapon_section_only() {
        let urls = find_weapon_images(PAGE, "Glock 17");
        assert_eq!(
            urls,
            vec![
                "https://www.imfdb.org/images/a/ab/Glock17.jpg".to_string(),
                "https://www.imfdb.org/images/c/cd/Glock_side.png".to_string(),
            ]
        );
        assert_eq!(
            find_weapon_images(PAGE, "colt m1911"),
            vec!["https://www.imfdb.org/images/e/ef/M1911.jpg".to_string()]
        );
    }

    #[test]
    fn missing_heading_yields_nothing() {
        assert!(find_weapon_images(PAGE, "AK-47").is_empty());
        assert!(find_weapon_images(PAGE, "").is_empty());
    }

    #[test]
    fn resolves_relative_and_protocol_relative_urls() {
        assert_eq!(
            resolve_image_url("//upload.example/x.png").as_deref(),
            Some("https://upload.example/x.png")
        );
        assert_eq!(
            resolve_image_url("/images/x.png").as_deref(),
            Some("https://www.imfdb.org/images/x.png")
        );
        assert_eq!(resolve_image_url("data:image/png;base64,AAAA"), None);
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("M4A1 / \"Carbine\"?"), "M4A1_Carbine");
        assert_eq!(sanitize_filename("___"), "unknown");
        assert_eq!(sanitize_filename(&"x".repeat(150)).len(), 100);
    }

    #[test]
    fn extension_defaults_to_jpg() {
        assert_eq!(file_extension("https://a/b/c.PNG"), ".png");
        assert_eq!(file_extension("https://a/b/c.webp?x=1"), ".webp");
        assert_eq!(file_extension("https://a/b/c"), ".jpg");
    }

    #[test]
    fn report_lists_counts() {
        let stats = ImageStats {
            processed: 4,
            downloaded: 3,
            failed: 1,
            skipped: 0,
            total_bytes: 3 * 1024 * 1024,
        };
        let report = render_image_report(&stats, Path::new("images"));
        assert!(report.contains("Success rate: 75.0%"));
        assert!(report.contains("Total size: 3.00 MB"));
        assert!(report.starts_with(&"=".repeat(60)));
    }

    #[tokio::test]
    async fn downloads_mirror_and_skip_existing() {
        let mut server = Server::new_async().await;
        let big = server
            .mock("GET", "/big.png")
            .with_status(200)
            .with_body(vec![7u8; 2048])
            .expect(1)
            .create_async()
            .await;
        let _small = server
            .mock("GET", "/small.gif")
            .with_status(200)
            .with_body("tiny")
            .create_async()
            .await;
        let dir = tempdir().unwrap();
        let client = crate::fetcher::build_http_client(Duration::from_secs(5)).unwrap();
        let mut dl = ImageDownloader::new(
            client,
            dir.path(),
            FetchOptions::new(1, Duration::ZERO),
            Duration::ZERO,
        );
        let record = WeaponRecord::new("MW2", "Pistols", "Glock 17", "Glock 17", "X13");
        let urls = vec![
            format!("{}/big.png", server.url()),
            format!("{}/small.gif", server.url()),
        ];

        let saved = dl.download_weapon_images(&record, &urls).await;
        assert_eq!(saved, vec![dir.path().join("by_game/MW2/Glock_17_1.png")]);
        assert!(dir.path().join("by_weapon/Glock_17/Glock_17_1.png").exists());
        assert!(!dir.path().join("by_game/MW2/Glock_17_2.gif").exists());
        assert_eq!(dl.stats().downloaded, 1);
        assert_eq!(dl.stats().failed, 1);

        // second pass finds the file on disk
        dl.download_weapon_images(&record, &urls[..1]).await;
        assert_eq!(dl.stats().skipped, 1);
        big.assert_async().await;
    }

    #[tokio::test]
    async fn unwritable_root_counts_failures_instead_of_erroring() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"file").unwrap();
        let client = crate::fetcher::build_http_client(Duration::from_secs(5)).unwrap();
        let mut dl = ImageDownloader::new(
            client,
            &blocker,
            FetchOptions::new(1, Duration::ZERO),
            Duration::ZERO,
        );
        let record = WeaponRecord::new("MW2", "Pistols", "Glock 17", "", "Glock 17");
        let mut pages = BTreeMap::new();
        pages.insert("MW2".to_string(), PAGE.to_string());

        let saved = dl.download_all(std::slice::from_ref(&record), &pages).await;
        assert_eq!(saved.get("MW2|Glock 17"), Some(&Vec::new()));
        assert_eq!(dl.stats().processed, 2);
        assert_eq!(dl.stats().failed, 2);
        assert_eq!(dl.stats().downloaded, 0);
    }
}
