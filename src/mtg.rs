//! Catalog client speaking the Scryfall REST API directly over reqwest.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use tracing::{debug, info, warn};

use crate::config::CatalogConfig;
use crate::error::{Result, SpoilerError};
use crate::models::{Card, CardList, CatalogResponse, CatalogResult, SetCode};

/// Source of the cards spoiled so far for a set.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Cards in reveal order, one entry per unique printing as the upstream
    /// deduplicates them.
    async fn fetch_spoiled_cards(&self, set: &SetCode) -> Result<CatalogResult>;
}

/// Scryfall's card search.
pub struct ScryfallCatalog {
    client: reqwest::Client,
    base_url: String,
    max_pages: usize,
}

impl ScryfallCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            max_pages: config.max_pages.max(1),
        })
    }

    pub fn search_url(&self) -> String {
        format!("{}/cards/search", self.base_url)
    }

    /// Query for every printing of the set, oldest spoiler first.
    pub fn search_query(set: &SetCode) -> [(&'static str, String); 3] {
        [
            ("order", "spoiled".to_owned()),
            ("q", format!("e:{set}")),
            ("unique", "prints".to_owned()),
        ]
    }

    async fn fetch_page(&self, request: reqwest::RequestBuilder) -> Result<Option<CardList>> {
        let response = request
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        parse_page(status, &body)
    }
}

/// Decodes one search response. `Ok(None)` is the upstream's "no cards
/// matched" answer, which is an empty result rather than a failure.
pub fn parse_page(status: StatusCode, body: &str) -> Result<Option<CardList>> {
    let parsed = serde_json::from_str::<CatalogResponse>(body);

    match parsed {
        Ok(CatalogResponse::Error(e)) if status == StatusCode::NOT_FOUND && e.code == "not_found" => {
            debug!("catalog reported no matches: {}", e.details);
            Ok(None)
        }
        Ok(CatalogResponse::Error(e)) => {
            warn!(status = e.status, code = %e.code, "catalog returned an error object");
            Err(SpoilerError::CatalogStatus {
                status,
                body: e.details,
            })
        }
        _ if !status.is_success() => Err(SpoilerError::CatalogStatus {
            status,
            body: body.chars().take(500).collect(),
        }),
        Ok(CatalogResponse::List(list)) => Ok(Some(list)),
        Err(e) => Err(SpoilerError::CatalogParse(e)),
    }
}

#[async_trait]
impl Catalog for ScryfallCatalog {
    async fn fetch_spoiled_cards(&self, set: &SetCode) -> Result<CatalogResult> {
        let first = self
            .client
            .get(self.search_url())
            .query(&Self::search_query(set));

        let Some(page) = self.fetch_page(first).await? else {
            return Ok(CatalogResult::Empty);
        };

        let total = page.total_cards;
        let catalog = self;
        let (cards, end) = collect_pages(page, self.max_pages, move |url| {
            catalog.fetch_page(catalog.client.get(url))
        })
        .await?;

        match end {
            PagingEnd::Complete => {}
            PagingEnd::PageLimit => warn!(
                set = %set,
                fetched = cards.len(),
                total,
                max_pages = self.max_pages,
                "stopped at the page limit before the end of the set"
            ),
            PagingEnd::MissingLink => warn!(
                set = %set,
                fetched = cards.len(),
                total,
                "catalog reported more pages without a link to the next one"
            ),
            PagingEnd::NotFound => warn!(
                set = %set,
                fetched = cards.len(),
                total,
                "next catalog page matched no cards"
            ),
        }

        info!(set = %set, fetched = cards.len(), total, "fetched spoiled cards");
        Ok(CatalogResult::from_cards(cards, total))
    }
}

/// Why [`collect_pages`] stopped following `next_page` links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PagingEnd {
    Complete,
    PageLimit,
    MissingLink,
    NotFound,
}

/// Follows `next_page` links from the first page through `next`, reading at most
/// `max_pages` pages in total. Any page failing fails the whole fetch.
async fn collect_pages<F, Fut>(
    mut page: CardList,
    max_pages: usize,
    mut next: F,
) -> Result<(Vec<Card>, PagingEnd)>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Option<CardList>>>,
{
    let mut cards = std::mem::take(&mut page.data);
    let mut pages = 1;

    while page.has_more {
        if pages >= max_pages {
            return Ok((cards, PagingEnd::PageLimit));
        }
        let Some(url) = page.next_page.take() else {
            return Ok((cards, PagingEnd::MissingLink));
        };
        debug!(page = pages + 1, "following next catalog page");
        page = match next(url).await? {
            Some(page) => page,
            None => return Ok((cards, PagingEnd::NotFound)),
        };
        cards.append(&mut page.data);
        pages += 1;
    }

    Ok((cards, PagingEnd::Complete))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn query_requests_spoil_order_and_unique_prints() {
        let query = ScryfallCatalog::search_query(&SetCode::new("NEO"));
        assert_eq!(
            query,
            [
                ("order", "spoiled".to_owned()),
                ("q", "e:neo".to_owned()),
                ("unique", "prints".to_owned()),
            ]
        );
    }

    #[test]
    fn search_url_tolerates_trailing_slash() {
        let config = CatalogConfig {
            base_url: "https://api.scryfall.com/".into(),
            ..Default::default()
        };
        let catalog = ScryfallCatalog::new(&config).unwrap();
        assert_eq!(catalog.search_url(), "https://api.scryfall.com/cards/search");
    }

    #[test]
    fn not_found_is_empty_not_failure() {
        let body = r#"{"object":"error","code":"not_found","status":404,"details":"Your query didn't match any cards."}"#;
        assert!(parse_page(StatusCode::NOT_FOUND, body).unwrap().is_none());
    }

    #[test]
    fn other_errors_are_failures() {
        let body = r#"{"object":"error","code":"bad_request","status":400,"details":"bad"}"#;
        let err = parse_page(StatusCode::BAD_REQUEST, body).unwrap_err();
        assert!(matches!(err, SpoilerError::CatalogStatus { .. }));

        let err = parse_page(StatusCode::BAD_GATEWAY, "<html>oops</html>").unwrap_err();
        assert!(matches!(err, SpoilerError::CatalogStatus { status, .. } if status == StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn malformed_success_is_a_parse_error() {
        let err = parse_page(StatusCode::OK, "{\"object\":\"list\",\"data\":[").unwrap_err();
        assert!(matches!(err, SpoilerError::CatalogParse(_)));
    }

    #[test]
    fn list_page_decodes() {
        let body = r#"{"object":"list","total_cards":2,"has_more":true,
            "next_page":"https://api.scryfall.com/cards/search?page=2",
            "data":[{"id":"a","name":"A"},{"id":"b","name":"B"}]}"#;
        let page = parse_page(StatusCode::OK, body).unwrap().unwrap();
        assert_eq!(page.total_cards, 2);
        assert!(page.has_more);
        assert_eq!(page.data.len(), 2);
    }

    fn list(names: &[&str], next_page: Option<&str>) -> CardList {
        CardList {
            total_cards: 5,
            has_more: next_page.is_some(),
            next_page: next_page.map(str::to_owned),
            data: names
                .iter()
                .map(|name| Card {
                    id: name.to_string(),
                    name: name.to_string(),
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn names(cards: &[Card]) -> Vec<&str> {
        cards.iter().map(|card| card.name.as_str()).collect()
    }

    #[tokio::test]
    async fn pages_are_concatenated_in_order() {
        let requested = RefCell::new(Vec::new());
        let (cards, end) = collect_pages(list(&["A", "B"], Some("p2")), 10, |url| {
            requested.borrow_mut().push(url.clone());
            let page: Result<Option<CardList>> = Ok(Some(match url.as_str() {
                "p2" => list(&["C", "D"], Some("p3")),
                _ => list(&["E"], None),
            }));
            async move { page }
        })
        .await
        .unwrap();

        assert_eq!(names(&cards), ["A", "B", "C", "D", "E"]);
        assert_eq!(end, PagingEnd::Complete);
        assert_eq!(*requested.borrow(), ["p2", "p3"]);
    }

    #[tokio::test]
    async fn page_limit_stops_following_links() {
        let calls = RefCell::new(0);
        let (cards, end) = collect_pages(list(&["A"], Some("next")), 2, |_| {
            *calls.borrow_mut() += 1;
            let page: Result<Option<CardList>> = Ok(Some(list(&["B"], Some("next"))));
            async move { page }
        })
        .await
        .unwrap();

        assert_eq!(names(&cards), ["A", "B"]);
        assert_eq!(end, PagingEnd::PageLimit);
        assert_eq!(*calls.borrow(), 1);
    }

    #[tokio::test]
    async fn error_on_a_later_page_fails_the_fetch() {
        let result = collect_pages(list(&["A"], Some("p2")), 10, |_| {
            let page: Result<Option<CardList>> = Err(SpoilerError::CatalogStatus {
                status: StatusCode::BAD_GATEWAY,
                body: String::new(),
            });
            async move { page }
        })
        .await;

        assert!(matches!(
            result,
            Err(SpoilerError::CatalogStatus { status, .. }) if status == StatusCode::BAD_GATEWAY
        ));
    }

    #[tokio::test]
    async fn early_exits_are_told_apart_from_the_page_limit() {
        let (cards, end) = collect_pages(list(&["A"], Some("p2")), 10, |_| {
            let page: Result<Option<CardList>> = Ok(None);
            async move { page }
        })
        .await
        .unwrap();
        assert_eq!(names(&cards), ["A"]);
        assert_eq!(end, PagingEnd::NotFound);

        let mut dangling = list(&["A"], None);
        dangling.has_more = true;
        let calls = RefCell::new(0);
        let (cards, end) = collect_pages(dangling, 10, |_| {
            *calls.borrow_mut() += 1;
            let page: Result<Option<CardList>> = Ok(None);
            async move { page }
        })
        .await
        .unwrap();
        assert_eq!(names(&cards), ["A"]);
        assert_eq!(end, PagingEnd::MissingLink);
        assert_eq!(*calls.borrow(), 0);
    }
}
