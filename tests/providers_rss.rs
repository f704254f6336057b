// tests/providers_rss.rs
use news_sentiment::ingest::fetch_all;
use news_sentiment::ingest::providers::RssSource;
use news_sentiment::ingest::types::ArticleSource;
use std::fs;

#[tokio::test]
async fn parses_markets_fixture() {
    let xml = fs::read_to_string("tests/fixtures/markets_rss.xml").expect("fixture");
    let p = RssSource::from_fixture("markets", &xml);
    let items = p.fetch_latest().await.expect("ok");

    assert_eq!(items.len(), 4);
    assert_eq!(p.name(), "markets");
    assert_eq!(
        items[0].content,
        "Apple shares soar after record iPhone sales. Apple beat estimates, Reuters reports."
    );
    assert_eq!(
        items[1].content,
        "Tesla shares plunge on delivery miss. Deliveries fell short of guidance."
    );
    assert!(items[1].published_at.is_some());
    assert!(items[2].published_at.is_none());
    assert_eq!(items[3].content, "Apple shares soar after record iPhone sales.");
}

#[tokio::test]
async fn fetch_all_drops_duplicate_urls() {
    let xml = fs::read_to_string("tests/fixtures/markets_rss.xml").expect("fixture");
    let sources: Vec<Box<dyn ArticleSource>> = vec![
        Box::new(RssSource::from_fixture("a", &xml)),
        Box::new(RssSource::from_fixture("b", &xml)),
    ];
    let all = fetch_all(&sources).await;
    assert_eq!(all.len(), 3);
    // First occurrence wins.
    assert!(all[0].content.contains("Reuters reports"));
}

#[tokio::test]
async fn malformed_feed_is_an_error() {
    let p = RssSource::from_fixture("bad", "<html><body>not a feed</body></html>");
    assert!(p.fetch_latest().await.is_err());
}
