mod common;

use chrono::{TimeZone, Utc};
use common::*;
use senskrap::parser::{
    Parsed, parse, parse_broadcast_detail, parse_broadcast_list, parse_comment_stream,
    parse_premier_item, parse_premier_list, parse_user_profile,
};
use senskrap::*;
use url::Url;

fn context() -> ParseContext {
    ParseContext::new(Url::parse("https://twitcasting.tv").unwrap())
}

#[cfg(test)]
mod user_profile_tests {
    use super::*;

    #[test]
    fn test_parses_full_profile() {
        let user = parse_user_profile(USER_PROFILE, &context()).unwrap();

        assert_eq!(user.id, UserId("182224938".to_string()));
        assert_eq!(user.screen_id, "twitcasting_jp");
        assert_eq!(user.name, "TwitCasting Official");
        assert_eq!(user.profile_url, "https://twitcasting.tv/twitcasting_jp");
        assert_eq!(user.followers, 1200);
        assert_eq!(user.following, 340);
        assert_eq!(
            user.bio.as_deref(),
            Some("Official account of TwitCasting.\nNews and maintenance notices.")
        );
        assert_eq!(
            user.avatar_url.as_deref(),
            Some("https://imagegw02.twitcasting.tv/image3s/pbs.twimg.com/profile_images/182224938.jpg")
        );
    }

    #[test]
    fn test_optional_fields_fall_back_to_defaults() {
        let user = parse_user_profile(USER_PROFILE_MINIMAL, &context()).unwrap();

        assert_eq!(user.screen_id, "quiet_user");
        assert_eq!(user.name, "quiet_user");
        assert_eq!(user.followers, 0);
        assert_eq!(user.following, 0);
        assert_eq!(user.bio, None);
        assert_eq!(user.avatar_url, None);
    }

    #[test]
    fn test_missing_identifier_is_an_error() {
        let html = r#"<div class="tw-user-nav"><span class="tw-user-nav-screen-id">@someone</span></div>"#;
        let result = parse_user_profile(html, &context());

        match result {
            Err(ParseError::MissingField { field, .. }) => assert_eq!(field, "id"),
            other => panic!("Expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn test_unreadable_count_reports_the_text() {
        let html = r#"<div class="tw-user-nav" data-user-id="1">
            <span class="tw-user-nav-screen-id">@someone</span>
            <span class="tw-user-nav-follower-count">many</span>
        </div>"#;

        match parse_user_profile(html, &context()) {
            Err(ParseError::InvalidField { field, text, .. }) => {
                assert_eq!(field, "followers");
                assert_eq!(text, "many");
            }
            other => panic!("Expected InvalidField, got {other:?}"),
        }
    }
}

#[cfg(test)]
mod broadcast_tests {
    use super::*;

    #[test]
    fn test_malformed_item_is_isolated() {
        let page = parse_broadcast_list(BROADCAST_LIST, &context()).unwrap();

        assert_eq!(page.items.len(), 4);
        assert_eq!(page.failures.len(), 1);
        assert!(matches!(
            &page.failures[0],
            ParseError::MissingField { field, .. } if field == "id"
        ));

        let ids: Vec<u64> = page.items.iter().map(|b| b.id.0).collect();
        assert_eq!(ids, vec![800000005, 800000004, 800000002, 800000001]);
    }

    #[test]
    fn test_list_items_are_normalized() {
        let page = parse_broadcast_list(BROADCAST_LIST, &context()).unwrap();
        let viewers: Vec<u64> = page.items.iter().map(|b| b.viewers).collect();
        assert_eq!(viewers, vec![1200, 340, 0, 0]);

        let live = &page.items[0];
        assert_eq!(live.owner, UserId("182224938".to_string()));
        assert_eq!(live.owner_screen_id, "twitcasting_jp");
        assert_eq!(live.title, "Morning stream");
        assert_eq!(live.status, BroadcastStatus::Live);
        assert_eq!(
            live.started_at,
            Some(Utc.with_ymd_and_hms(2024, 6, 24, 10, 0, 0).unwrap())
        );
        assert_eq!(live.url, "https://twitcasting.tv/twitcasting_jp/movie/800000005");
        assert_eq!(
            live.thumbnail_url.as_deref(),
            Some("https://twitcasting.tv/img/movie/800000005.jpg")
        );

        // JST text with a weekday marker
        assert_eq!(
            page.items[1].started_at,
            Some(Utc.with_ymd_and_hms(2024, 6, 20, 12, 30, 0).unwrap())
        );
        assert_eq!(page.items[2].status, BroadcastStatus::Scheduled);

        let bare = &page.items[3];
        assert_eq!(bare.title, "");
        assert_eq!(bare.status, BroadcastStatus::Ended);
        assert_eq!(bare.started_at, None);
    }

    #[test]
    fn test_pager_yields_next_cursor() {
        let first = parse_broadcast_list(BROADCAST_LIST, &context()).unwrap();
        assert_eq!(first.next, Some(PageCursor::Page(1)));

        let last = parse_broadcast_list(
            BROADCAST_LIST,
            &context().with_cursor(Some(PageCursor::Page(2))),
        )
        .unwrap();
        assert_eq!(last.next, None);
    }

    #[test]
    fn test_list_without_owner_fails_as_a_whole() {
        let html = r#"<div class="tw-movie-list"><a class="tw-movie-thumbnail" href="/a/movie/1"></a></div>"#;
        assert!(parse_broadcast_list(html, &context()).is_err());
    }

    #[test]
    fn test_unknown_status_is_an_item_failure() {
        let html = r#"<div class="tw-movie-list" data-user-id="1" data-screen-id="a">
            <a class="tw-movie-thumbnail" href="/a/movie/1" data-status="paused"></a>
            <a class="tw-movie-thumbnail" href="/a/movie/2" data-status="live"></a>
        </div>"#;
        let page = parse_broadcast_list(html, &context()).unwrap();

        assert_eq!(page.items.len(), 1);
        assert!(matches!(
            &page.failures[0],
            ParseError::InvalidField { error: ValueError::InvalidStatus { .. }, .. }
        ));
    }

    #[test]
    fn test_parses_detail_page() {
        let broadcast = parse_broadcast_detail(BROADCAST_DETAIL, &context()).unwrap();

        assert_eq!(broadcast.id, BroadcastId(800000005));
        assert_eq!(broadcast.owner_screen_id, "twitcasting_jp");
        assert_eq!(broadcast.viewers, 12300);
        assert_eq!(broadcast.status, BroadcastStatus::Live);
        assert_eq!(
            broadcast.thumbnail_url.as_deref(),
            Some("https://imagegw02.twitcasting.tv/image3/movie/800000005.jpg")
        );
        assert_eq!(
            broadcast.url,
            "https://twitcasting.tv/twitcasting_jp/movie/800000005"
        );
    }

    #[test]
    fn test_status_moves_forward_only() {
        let scheduled = parse_broadcast_list(BROADCAST_LIST, &context())
            .unwrap()
            .items
            .remove(2);
        let mut ended = scheduled.clone();
        ended.status = BroadcastStatus::Ended;

        assert!(scheduled.is_valid_successor(&ended));
        assert!(!ended.is_valid_successor(&scheduled));
        assert!(BroadcastStatus::Live.can_transition_to(BroadcastStatus::Live));
        assert!(!BroadcastStatus::Live.can_transition_to(BroadcastStatus::Scheduled));
    }
}

#[cfg(test)]
mod comment_tests {
    use super::*;
    use serde_json::Value;

    fn comments() -> Value {
        serde_json::from_str(COMMENTS).unwrap()
    }

    #[test]
    fn test_parses_feed_with_positions() {
        let context = context()
            .with_broadcast(BroadcastId(800000005))
            .with_cursor(Some(PageCursor::Offset {
                offset: 50,
                limit: 4,
            }));
        let page = parse_comment_stream(&comments(), &context).unwrap();

        assert_eq!(page.items.len(), 3);
        assert_eq!(page.failures.len(), 1);

        let sequences: Vec<u64> = page.items.iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![50, 51, 53]);
        assert!(page.items.iter().all(|c| c.broadcast == BroadcastId(800000005)));

        assert_eq!(
            page.next,
            Some(PageCursor::Offset {
                offset: 54,
                limit: 4
            })
        );
    }

    #[test]
    fn test_out_of_range_timestamp_fails_only_its_entry() {
        let json: Value = serde_json::from_str(
            r#"{"comments": [
                {"id": 1, "created_at": -9223372036854775808},
                {"id": 2, "created_at": 1700000000}
            ]}"#,
        )
        .unwrap();
        let context = context().with_broadcast(BroadcastId(1));

        let page = parse_comment_stream(&json, &context).unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, CommentId(2));
        assert!(matches!(
            &page.failures[..],
            [ParseError::InvalidField { field, .. }] if field == "posted_at"
        ));
    }

    #[test]
    fn test_authors_and_timestamps() {
        let context = context().with_broadcast(BroadcastId(800000005));
        let page = parse_comment_stream(&comments(), &context).unwrap();

        let first = &page.items[0];
        assert_eq!(first.id, CommentId(1001));
        assert_eq!(first.text, "hello");
        assert_eq!(
            first.posted_at,
            Utc.with_ymd_and_hms(2024, 6, 24, 10, 0, 0).unwrap()
        );
        match &first.author {
            CommentAuthor::User(user) => {
                assert_eq!(user.screen_id, "twitcasting_jp");
                assert_eq!(user.profile_url, "https://twitcasting.tv/twitcasting_jp");
            }
            other => panic!("Expected a registered author, got {other:?}"),
        }

        let second = &page.items[1];
        assert_eq!(second.id, CommentId(1002));
        assert_eq!(second.author.display_name(), "guest");

        let last = &page.items[2];
        assert_eq!(
            last.posted_at,
            Utc.with_ymd_and_hms(2024, 6, 24, 10, 3, 20).unwrap()
        );
        assert!(matches!(last.author, CommentAuthor::Anonymous { .. }));
    }

    #[test]
    fn test_requires_broadcast_in_context() {
        assert!(parse_comment_stream(&comments(), &context()).is_err());
    }

    #[test]
    fn test_last_page_has_no_cursor() {
        let json: Value = serde_json::from_str(&comment_page(1, 2, false)).unwrap();
        let context = context().with_broadcast(BroadcastId(1));
        let page = parse_comment_stream(&json, &context).unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next, None);
    }
}

#[cfg(test)]
mod premier_tests {
    use super::*;

    #[test]
    fn test_parses_result_links() {
        let page = parse_premier_list(PREMIER_LIST, &context()).unwrap();

        assert_eq!(
            page.items,
            vec![
                "https://twitcasting.tv/twitcasting_jp/shopcart/311111".to_string(),
                "https://twitcasting.tv/idol_group/shopcart/322222".to_string(),
            ]
        );
        assert_eq!(page.failures.len(), 1);
        assert_eq!(page.next, Some(PageCursor::Page(1)));
    }

    #[test]
    fn test_empty_state_yields_nothing() {
        let page = parse_premier_list(PREMIER_EMPTY, &context()).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.next, None);
    }

    #[test]
    fn test_without_pager_there_is_one_page() {
        let page = parse_premier_list(&premier_page(&["/a/shopcart/1"], 0), &context()).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next, None);
    }

    #[test]
    fn test_parses_item_page() {
        let url = "https://twitcasting.tv/idol_group/shopcart/322222";
        let item = parse_premier_item(PREMIER_ITEM, url, &context()).unwrap();

        assert_eq!(item.url, url);
        assert_eq!(item.title.as_deref(), Some("Summer Live 2024"));
        assert_eq!(item.author.as_deref(), Some("Idol Group"));
        assert_eq!(
            item.author_url.as_deref(),
            Some("https://twitcasting.tv/idol_group")
        );
        assert_eq!(item.date.as_deref(), Some("2024/07/20(土) 18:00"));
        assert_eq!(
            item.description.as_deref(),
            Some("Live from the summer hall.\nSetlist:\n1. Opening")
        );
        assert_eq!(
            item.image_url.as_deref(),
            Some("https://imagegw02.twitcasting.tv/shop/322222.jpg")
        );
        assert_eq!(item.available_until.as_deref(), Some("2024/08/03 23:59"));
        assert_eq!(
            item.archive_sales_deadline.as_deref(),
            Some("2024/08/01 23:59")
        );

        assert_eq!(item.tickets.len(), 2);
        assert_eq!(item.tickets[0].title.as_deref(), Some("Stream ticket"));
        assert_eq!(item.tickets[0].price.as_deref(), Some("¥3,000"));
        assert_eq!(item.tickets[1].price.as_deref(), Some("¥5,500"));
    }

    #[test]
    fn test_bare_item_page_has_no_fields() {
        let html = r#"<div class="tw-shop-item-header"></div>"#;
        let item = parse_premier_item(html, "https://twitcasting.tv/x", &context()).unwrap();

        assert_eq!(item.title, None);
        assert_eq!(item.author_url, None);
        assert!(item.tickets.is_empty());
    }
}

#[cfg(test)]
mod dispatch_tests {
    use super::*;
    use senskrap::transport::HttpResponse;

    fn response(body: &str, content_type: &str) -> HttpResponse {
        HttpResponse {
            url: PROFILE_URL.to_string(),
            status: 200,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body: body.to_string(),
        }
    }

    #[test]
    fn test_parsing_is_idempotent() {
        let cases = [
            (PageKind::UserProfilePage, USER_PROFILE),
            (PageKind::BroadcastListPage, BROADCAST_LIST),
            (PageKind::BroadcastDetailPage, BROADCAST_DETAIL),
            (PageKind::PremierListPage, PREMIER_LIST),
            (PageKind::PremierItemPage, PREMIER_ITEM),
        ];
        for (kind, body) in cases {
            let payload = kind.inspect(response(body, "text/html")).unwrap();
            let first = parse(&payload, &context()).unwrap();
            let second = parse(&payload, &context()).unwrap();
            assert_eq!(first, second, "{kind:?}");
        }

        let payload = PageKind::CommentStreamResponse
            .inspect(response(COMMENTS, "application/json"))
            .unwrap();
        let context = context().with_broadcast(BroadcastId(1));
        assert_eq!(
            parse(&payload, &context).unwrap(),
            parse(&payload, &context).unwrap()
        );
    }

    #[test]
    fn test_dispatches_by_kind() {
        let payload = PageKind::UserProfilePage
            .inspect(response(USER_PROFILE, "text/html"))
            .unwrap();
        assert!(matches!(parse(&payload, &context()), Ok(Parsed::User(_))));
    }

    #[test]
    fn test_error_page_is_missing_resource() {
        let result = PageKind::UserProfilePage.inspect(response(ERROR_NOT_FOUND, "text/html"));
        assert!(matches!(result, Err(FetchError::Missing { .. })));
    }

    #[test]
    fn test_missing_signature_is_unexpected() {
        let result =
            PageKind::UserProfilePage.inspect(response(REDESIGNED_PROFILE, "text/html"));
        assert!(matches!(result, Err(FetchError::UnexpectedResponse { .. })));
    }

    #[test]
    fn test_content_type_must_match_kind() {
        let result = PageKind::UserProfilePage.inspect(response("{}", "application/json"));
        assert!(matches!(result, Err(FetchError::UnexpectedResponse { .. })));

        let result = PageKind::CommentStreamResponse.inspect(response(USER_PROFILE, "text/html"));
        assert!(matches!(result, Err(FetchError::UnexpectedResponse { .. })));
    }

    #[test]
    fn test_json_error_codes() {
        let missing = PageKind::CommentStreamResponse
            .inspect(response(r#"{"error": {"code": 404}}"#, "application/json"));
        assert!(matches!(missing, Err(FetchError::Missing { .. })));

        let throttled = PageKind::CommentStreamResponse.inspect(response(
            r#"{"error": {"code": "too_many_requests"}}"#,
            "application/json",
        ));
        assert!(matches!(throttled, Err(FetchError::Throttled { .. })));

        let changed = PageKind::CommentStreamResponse
            .inspect(response(r#"{"items": []}"#, "application/json"));
        assert!(matches!(changed, Err(FetchError::UnexpectedResponse { .. })));
    }
}
