use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::models::{collapse_whitespace, offer_id_from_url, PriceProvenance, RawListing};
use crate::scrapers::rate_limit::RateLimiter;
use crate::scrapers::traits::ListingSource;
use crate::scrapers::types::{DetailPage, ListingCard, ListingPage, ScrapeParams};

lazy_static! {
    static ref CARD: Selector = Selector::parse(r#"div[data-cy="l-card"]"#).unwrap();
    static ref LINK: Selector = Selector::parse("a[href]").unwrap();
    static ref TITLE_H6: Selector = Selector::parse("h6").unwrap();
    static ref TITLE_H4: Selector = Selector::parse("h4").unwrap();
    static ref TITLE_STRONG: Selector = Selector::parse("strong").unwrap();
    static ref CARD_PRICE: Selector = Selector::parse(r#"p[data-testid="ad-price"]"#).unwrap();
    static ref CARD_SNIPPET: Selector = Selector::parse(r#"p[class*="description"]"#).unwrap();
    static ref NEXT_PAGE: Selector =
        Selector::parse(r#"a[data-testid="pagination-forward"]"#).unwrap();
    static ref PAGINATION_LINK: Selector =
        Selector::parse(r#"ul[data-testid="pagination-list"] a[href]"#).unwrap();
    static ref DESCRIPTION: Selector = Selector::parse(r#"div[data-cy="ad_description"]"#).unwrap();
    static ref DETAIL_PRICE: Selector =
        Selector::parse(r#"div[data-testid="ad-price-container"] h3"#).unwrap();
    static ref JSON_LD: Selector =
        Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    static ref DISPLAY_PRICE: Regex = Regex::new(r"\d{1,3}(?:[ \x{a0}]\d{3})+|\d+").unwrap();
}

/// OLX category scraper: listing pages first, then each listing's own page
pub struct OlxScraper {
    client: Client,
    params: ScrapeParams,
    limiter: RateLimiter,
}

impl OlxScraper {
    pub fn new(params: ScrapeParams) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .build()
            .context("Failed to create HTTP client")?;

        let limiter = RateLimiter::from_secs(params.min_delay_secs, params.max_delay_secs);

        Ok(Self {
            client,
            params,
            limiter,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        self.limiter.wait().await;
        debug!("Fetching URL: {}", url);

        let response = self
            .client
            .get(url)
            .header("Accept-Language", "pl,en-US;q=0.7,en;q=0.3")
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch {}: {}", url, response.status());
        }

        response.text().await.context("Failed to read response body")
    }

    /// Walk the category pages and collect unique cards
    async fn scrape_cards(&self) -> Result<Vec<ListingCard>> {
        let mut url = Url::parse(&self.params.base_url).context("Invalid base URL")?;
        let mut seen = HashSet::new();
        let mut cards = Vec::new();

        for page_num in 1..=self.params.max_pages {
            let html = match self.fetch(url.as_str()).await {
                Ok(html) => html,
                Err(e) if page_num == 1 => return Err(e),
                Err(e) => {
                    warn!(page = page_num, error = %e, "Failed to fetch listing page, stopping");
                    break;
                }
            };

            let page = parse_listing_page(&html, &url, page_num);
            info!(page = page_num, cards = page.cards.len(), "Parsed listing page");

            if page.cards.is_empty() {
                break;
            }
            for card in page.cards {
                if seen.insert(card.url.clone()) {
                    cards.push(card);
                }
            }

            match page.next_page.and_then(|next| Url::parse(&next).ok()) {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(cards)
    }

    /// Add description and price from the listing's own page
    async fn complete(&self, card: ListingCard, known_prices: &HashMap<String, u32>) -> RawListing {
        let id = offer_id_from_url(&card.url);

        // the card must carry a number, or the address would be lost with the description
        let card_has_number = card
            .title
            .chars()
            .chain(card.snippet.chars())
            .any(|c| c.is_ascii_digit());

        if let Some(&price) = known_prices.get(&id) {
            if card_has_number {
                debug!(offer_id = %id, price, "Reusing known structured price");
                return RawListing {
                    description: card.snippet,
                    url: card.url,
                    title: card.title,
                    structured_price: Some(price),
                    structured_price_provenance: Some(PriceProvenance::CachedObservation),
                };
            }
        }

        match self.fetch(&card.url).await {
            Ok(html) => build_listing(card, parse_detail_page(&html)),
            Err(e) => {
                warn!(url = %card.url, error = %e, "Failed to fetch listing details, using card data");
                build_listing(card, DetailPage::default())
            }
        }
    }
}

#[async_trait]
impl ListingSource for OlxScraper {
    async fn scrape(&self, known_prices: &HashMap<String, u32>) -> Result<Vec<RawListing>> {
        info!(url = %self.params.base_url, "Starting OLX scrape");

        let cards = self.scrape_cards().await?;
        info!(cards = cards.len(), "Fetching listing details");

        let listings: Vec<RawListing> = stream::iter(cards)
            .map(|card| self.complete(card, known_prices))
            .buffered(self.params.max_detail_workers.max(1))
            .collect()
            .await;

        info!(listings = listings.len(), "OLX scrape finished");
        Ok(listings)
    }

    fn source_name(&self) -> &'static str {
        "OLX"
    }
}

/// Cards and next-page link of one category page.
///
/// Only `/d/oferta/` links are kept; promoted cards pointing elsewhere are skipped.
pub fn parse_listing_page(html: &str, page_url: &Url, page_num: usize) -> ListingPage {
    let document = Html::parse_document(html);
    let mut cards = Vec::new();

    for card in document.select(&CARD) {
        let Some(href) = card.select(&LINK).next().and_then(|a| a.value().attr("href")) else {
            continue;
        };
        let Ok(url) = page_url.join(href) else {
            continue;
        };
        if !url.path().contains("/d/oferta/") {
            continue;
        }

        let title = [&*TITLE_H6, &*TITLE_H4, &*TITLE_STRONG]
            .into_iter()
            .find_map(|sel| card.select(sel).next())
            .map(element_text)
            .unwrap_or_default();

        cards.push(ListingCard {
            url: url.to_string(),
            title,
            snippet: card
                .select(&CARD_SNIPPET)
                .next()
                .map(element_text)
                .unwrap_or_default(),
            price: card
                .select(&CARD_PRICE)
                .next()
                .and_then(|p| parse_display_price(&element_text(p))),
        });
    }

    ListingPage {
        cards,
        next_page: next_page_url(&document, page_url, page_num),
    }
}

fn next_page_url(document: &Html, page_url: &Url, page_num: usize) -> Option<String> {
    if let Some(href) = document
        .select(&NEXT_PAGE)
        .next()
        .and_then(|a| a.value().attr("href"))
    {
        return page_url.join(href).ok().map(|u| u.to_string());
    }

    let wanted = format!("page={}", page_num + 1);
    document
        .select(&PAGINATION_LINK)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.contains(&wanted))
        .and_then(|href| page_url.join(href).ok())
        .map(|u| u.to_string())
}

/// Description and price candidates from a listing page
pub fn parse_detail_page(html: &str) -> DetailPage {
    let document = Html::parse_document(html);

    let structured_price = document.select(&JSON_LD).find_map(|script| {
        let text: String = script.text().collect();
        serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|json| jsonld_offer_price(&json))
    });

    DetailPage {
        description: document
            .select(&DESCRIPTION)
            .next()
            .map(element_text)
            .unwrap_or_default(),
        structured_price,
        visible_price: document
            .select(&DETAIL_PRICE)
            .next()
            .and_then(|el| parse_display_price(&element_text(el))),
    }
}

/// `offers.price` anywhere in a JSON-LD document (handles `@graph` and arrays)
fn jsonld_offer_price(json: &Value) -> Option<u32> {
    match json {
        Value::Array(items) => items.iter().find_map(jsonld_offer_price),
        Value::Object(map) => {
            if let Some(offers) = map.get("offers") {
                let price = match offers {
                    Value::Array(list) => list.iter().find_map(|o| o.get("price")),
                    other => other.get("price"),
                };
                if let Some(amount) = price.and_then(price_value) {
                    return Some(amount);
                }
            }
            map.get("@graph").and_then(jsonld_offer_price)
        }
        _ => None,
    }
}

fn price_value(value: &Value) -> Option<u32> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok()?,
        _ => return None,
    };
    if amount > 0.0 && amount <= f64::from(u32::MAX) {
        Some(amount.round() as u32)
    } else {
        None
    }
}

/// "1 200 zł" -> 1200; `None` for "Za darmo" and the like
fn parse_display_price(text: &str) -> Option<u32> {
    let m = DISPLAY_PRICE.find(text)?;
    m.as_str()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .ok()
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// Merge card and detail data, picking the most trusted price available
fn build_listing(card: ListingCard, detail: DetailPage) -> RawListing {
    let description = if detail.description.is_empty() {
        card.snippet
    } else {
        detail.description
    };

    let (structured_price, provenance) = match (detail.structured_price, detail.visible_price.or(card.price)) {
        (Some(price), _) => (Some(price), Some(PriceProvenance::StructuredMarkup)),
        (None, Some(price)) => (Some(price), Some(PriceProvenance::HtmlFallback)),
        (None, None) => (None, None),
    };

    RawListing {
        url: card.url,
        title: card.title,
        description,
        structured_price,
        structured_price_provenance: provenance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_PAGE: &str = r#"
        <html><body>
          <div data-cy="l-card">
            <a href="/d/oferta/pokoj-przy-zana-CID3-ID1abc.html">
              <h6>Pokój przy Zana 5</h6>
            </a>
            <p data-testid="ad-price">750 zł</p>
            <p class="css-1 description-snippet">Umeblowany, blisko UMCS</p>
          </div>
          <div data-cy="l-card">
            <a href="https://www.otodom.pl/pl/oferta/mieszkanie-ID9"><h6>Promowane</h6></a>
          </div>
          <div data-cy="l-card">
            <a href="https://www.olx.pl/d/oferta/stancja-CID3-ID2def.html?reason=extended">
              <h4>Stancja dla studentki</h4>
            </a>
            <p data-testid="ad-price">1 200 zł do negocjacji</p>
          </div>
          <ul data-testid="pagination-list">
            <li><a href="/nieruchomosci/stancje-pokoje/lublin/?page=2">2</a></li>
          </ul>
        </body></html>
    "#;

    fn base() -> Url {
        Url::parse("https://www.olx.pl/nieruchomosci/stancje-pokoje/lublin/").unwrap()
    }

    #[test]
    fn test_parse_listing_page() {
        let page = parse_listing_page(LISTING_PAGE, &base(), 1);

        assert_eq!(page.cards.len(), 2);
        assert_eq!(
            page.cards[0].url,
            "https://www.olx.pl/d/oferta/pokoj-przy-zana-CID3-ID1abc.html"
        );
        assert_eq!(page.cards[0].title, "Pokój przy Zana 5");
        assert_eq!(page.cards[0].price, Some(750));
        assert_eq!(page.cards[0].snippet, "Umeblowany, blisko UMCS");
        assert_eq!(page.cards[1].title, "Stancja dla studentki");
        assert_eq!(page.cards[1].price, Some(1200));
        assert_eq!(
            page.next_page.as_deref(),
            Some("https://www.olx.pl/nieruchomosci/stancje-pokoje/lublin/?page=2")
        );
    }

    #[test]
    fn test_forward_link_preferred_and_last_page() {
        let html = r#"<div data-cy="l-card"><a href="/d/oferta/a-ID1.html"><h6>A</h6></a></div>
            <a data-testid="pagination-forward" href="?page=7">next</a>"#;
        let page = parse_listing_page(html, &base(), 6);
        assert_eq!(
            page.next_page.as_deref(),
            Some("https://www.olx.pl/nieruchomosci/stancje-pokoje/lublin/?page=7")
        );

        let last = parse_listing_page(LISTING_PAGE, &base(), 2);
        assert!(last.next_page.is_none());
    }

    #[test]
    fn test_detail_page_prefers_json_ld() {
        let html = r#"<html><head>
            <script type="application/ld+json">
              {"@context": "https://schema.org", "@type": "Product", "name": "Pokój",
               "offers": {"@type": "Offer", "price": 700, "priceCurrency": "PLN"}}
            </script></head><body>
            <div data-testid="ad-price-container"><h3>150 zł</h3></div>
            <div data-cy="ad_description"><div>Pokój przy ul. Zana 5.<br>Cena 700 zł + media 150 zł.</div></div>
            </body></html>"#;

        let detail = parse_detail_page(html);
        assert_eq!(detail.structured_price, Some(700));
        assert_eq!(detail.visible_price, Some(150));
        assert_eq!(detail.description, "Pokój przy ul. Zana 5. Cena 700 zł + media 150 zł.");
    }

    #[test]
    fn test_jsonld_variants() {
        let graph: Value = serde_json::from_str(
            r#"{"@graph": [{"@type": "BreadcrumbList"}, {"offers": [{"price": "2400.00"}]}]}"#,
        )
        .unwrap();
        assert_eq!(jsonld_offer_price(&graph), Some(2400));

        let none: Value = serde_json::from_str(r#"{"@type": "Organization"}"#).unwrap();
        assert_eq!(jsonld_offer_price(&none), None);

        let zero: Value = serde_json::from_str(r#"{"offers": {"price": 0}}"#).unwrap();
        assert_eq!(jsonld_offer_price(&zero), None);
    }

    #[test]
    fn test_build_listing_provenance() {
        let card = ListingCard {
            url: "https://www.olx.pl/d/oferta/a-ID1.html".into(),
            title: "Pokój Zana 5".into(),
            snippet: "krótki opis".into(),
            price: Some(650),
        };

        let from_markup = build_listing(
            card.clone(),
            DetailPage {
                description: "pełny opis".into(),
                structured_price: Some(700),
                visible_price: Some(700),
            },
        );
        assert_eq!(from_markup.structured_price, Some(700));
        assert_eq!(
            from_markup.structured_price_provenance,
            Some(PriceProvenance::StructuredMarkup)
        );
        assert_eq!(from_markup.description, "pełny opis");

        let from_card = build_listing(card.clone(), DetailPage::default());
        assert_eq!(from_card.structured_price, Some(650));
        assert_eq!(
            from_card.structured_price_provenance,
            Some(PriceProvenance::HtmlFallback)
        );
        assert_eq!(from_card.description, "krótki opis");

        let bare = build_listing(
            ListingCard { price: None, ..card },
            DetailPage::default(),
        );
        assert!(bare.structured_price.is_none());
        assert!(bare.structured_price_provenance.is_none());
    }

    #[test]
    fn test_display_price() {
        assert_eq!(parse_display_price("750 zł"), Some(750));
        assert_eq!(parse_display_price("1\u{a0}200 zł"), Some(1200));
        assert_eq!(parse_display_price("Za darmo"), None);
    }
}
