use scraper::{Html, Selector};
use std::io::Cursor;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use yana::config::FetchConfig;
use yana::content::rules::parse_rules;
use yana::content::{ContentProcessor, ProcessOptions};
use yana::images::ImageExtractor;
use yana::Fetcher;

fn processor() -> ContentProcessor {
    let fetcher = Arc::new(Fetcher::new(FetchConfig::default()));
    ContentProcessor::new(Arc::new(ImageExtractor::new(fetcher)))
}

fn noise_png(width: u32, height: u32) -> Vec<u8> {
    let mut seed = 0x2545f491u32;
    let img = image::RgbImage::from_fn(width, height, |_, _| {
        seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
        image::Rgb([(seed >> 8) as u8, (seed >> 16) as u8, (seed >> 24) as u8])
    });
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

fn count_elements(html: &str, selector: &str) -> usize {
    let doc = Html::parse_document(html);
    let sel = Selector::parse(selector).unwrap();
    doc.select(&sel).count()
}

#[tokio::test]
async fn output_has_single_article_root_and_footer_invariants() {
    let processor = processor();
    let opts = ProcessOptions {
        article_url: "http://site/post".to_string(),
        add_source_footer: true,
        generate_title_image: false,
        ..Default::default()
    };

    let out = processor
        .process("<p>one</p><p>two</p>", &opts)
        .await
        .unwrap();

    assert_eq!(count_elements(&out, "article"), 1);
    assert!(count_elements(&out, "article > header") <= 1);
    assert_eq!(count_elements(&out, "article > footer"), 1);

    let doc = Html::parse_document(&out);
    let footer_link = Selector::parse("footer a").unwrap();
    let href = doc
        .select(&footer_link)
        .next()
        .and_then(|a| a.value().attr("href").map(|h| h.to_string()))
        .unwrap();
    assert_eq!(href, "http://site/post");
}

#[tokio::test]
async fn title_image_header_is_synthesized_from_in_content_image() {
    let server = MockServer::start().await;
    let png = noise_png(1300, 400);
    Mock::given(method("GET"))
        .and(path("/img1.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png, "image/png"))
        .mount(&server)
        .await;

    let processor = processor();
    let opts = ProcessOptions {
        article_url: format!("{}/post", server.uri()),
        generate_title_image: true,
        add_source_footer: true,
        ..Default::default()
    };

    let input = format!(
        "<article><p>Intro</p><p><img src=\"{}/img1.png\"></p></article>",
        server.uri()
    );
    let out = processor.process(&input, &opts).await.unwrap();

    assert_eq!(count_elements(&out, "article"), 1);
    assert_eq!(count_elements(&out, "article > header"), 1);
    assert!(out.contains("data:image/webp;base64,"));
    assert!(out.contains("alt=\"Article image\""));
    // The origin image is gone from the body; only the header keeps one.
    assert_eq!(count_elements(&out, "section img"), 0);
    assert_eq!(count_elements(&out, "header img"), 1);
    assert!(out.contains("Intro"));
}

#[tokio::test]
async fn existing_header_is_preserved_not_duplicated() {
    let processor = processor();
    let opts = ProcessOptions {
        article_url: "http://site/post".to_string(),
        generate_title_image: true,
        ..Default::default()
    };

    let input = "<article><header><h1>Original</h1></header><p>text</p></article>";
    let out = processor.process(input, &opts).await.unwrap();

    assert_eq!(count_elements(&out, "header"), 1);
    assert!(out.contains("Original"));
}

#[tokio::test]
async fn youtube_header_embeds_and_dedups_video_links() {
    let processor = processor();
    let opts = ProcessOptions {
        article_url: "http://site/video-post".to_string(),
        header_image_url: Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string()),
        generate_title_image: true,
        ..Default::default()
    };

    let input = concat!(
        "<p><a href=\"https://youtu.be/dQw4w9WgXcQ\">Watch on YouTube</a></p>",
        "<p>Review text</p>"
    );
    let out = processor.process(input, &opts).await.unwrap();

    assert!(out.contains("youtube.com/embed/dQw4w9WgXcQ"));
    assert_eq!(count_elements(&out, "header iframe"), 1);
    // The duplicate link inside the body is removed, its empty parent
    // collapsed.
    assert_eq!(count_elements(&out, "section a"), 0);
    assert!(out.contains("Review text"));
}

#[tokio::test]
async fn reddit_embed_header_removes_leftovers() {
    let processor = processor();
    let opts = ProcessOptions {
        article_url: "https://www.reddit.com/r/x/comments/abc/title/".to_string(),
        header_image_url: Some("https://vxreddit.com/r/x/comments/abc/title".to_string()),
        generate_title_image: true,
        ..Default::default()
    };

    let input = concat!(
        "<p><a href=\"https://reddit.com/r/x/comments/abc/title\">View video</a></p>",
        "<p><img src=\"https://preview.redd.it/abc.jpg\" alt=\"video thumbnail\"></p>",
        "<p>Discussion text</p>"
    );
    let out = processor.process(input, &opts).await.unwrap();

    assert_eq!(count_elements(&out, "header iframe"), 1);
    assert!(out.contains("vxreddit.com"));
    assert!(!out.contains("View video"));
    assert!(!out.contains("preview.redd.it"));
    assert_eq!(count_elements(&out, "section p"), 1);
    assert!(out.contains("Discussion text"));
}

#[tokio::test]
async fn comment_sections_move_behind_primary_content() {
    let processor = processor();
    let opts = ProcessOptions {
        article_url: "http://site/post".to_string(),
        generate_title_image: false,
        ..Default::default()
    };

    let input = concat!(
        "<body>",
        "<section><p>the story itself</p></section>",
        "<section><h2>Comments</h2><p>first!</p></section>",
        "</body>"
    );
    let out = processor.process(input, &opts).await.unwrap();

    let story_pos = out.find("the story itself").unwrap();
    let comments_pos = out.find("Comments").unwrap();
    assert!(story_pos < comments_pos);
    assert_eq!(count_elements(&out, "article > section"), 2);
}

#[tokio::test]
async fn configured_selectors_and_regex_rules_apply() {
    let processor = processor();
    let opts = ProcessOptions {
        article_url: "http://site/post".to_string(),
        generate_title_image: false,
        selectors_to_remove: vec![".ads".to_string(), ".social-share".to_string()],
        regex_rules: parse_rules("Sponsored: |"),
        ..Default::default()
    };

    let input = concat!(
        "<p>Sponsored: great read</p>",
        "<div class=\"ads\">buy now</div>",
        "<div class=\"social-share\">share</div>"
    );
    let out = processor.process(input, &opts).await.unwrap();

    assert!(!out.contains("buy now"));
    assert!(!out.contains("share"));
    assert!(!out.contains("Sponsored: "));
    assert!(out.contains("great read"));
}

#[tokio::test]
async fn skip_article_from_image_fetch_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let processor = processor();
    let opts = ProcessOptions {
        article_url: format!("{}/post", server.uri()),
        generate_title_image: true,
        ..Default::default()
    };

    let input = format!("<p><img src=\"{}/gone.png\"></p>", server.uri());
    let err = processor.process(&input, &opts).await.unwrap_err();
    assert!(err.is_skip());
    assert_eq!(err.status, Some(404));
}
