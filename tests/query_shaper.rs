use anyhow::Result;
use rust_decimal::Decimal;
use serde_json::json;
use worldcities::query::{MatchCase, shape};
use worldcities::{
    City, Country, Error, MemoryStore, NewCity, NewCountry, PageRequest, PageResult, Shaper,
    SortFieldPolicy,
};

fn letters(n: usize) -> Vec<Country> {
    (0..n)
        .map(|i| {
            let ch = char::from(b'A' + i as u8);
            Country {
                id: i as i32 + 1,
                name: format!("{ch}land"),
                iso2: format!("{ch}{ch}"),
                iso3: format!("{ch}{ch}{ch}"),
            }
        })
        .collect()
}

fn seeded_cities() -> Result<MemoryStore> {
    let store = MemoryStore::new();
    store.add_countries(vec![
        NewCountry::new("Japan", "JP", "JPN"),
        NewCountry::new("Brazil", "BR", "BRA"),
    ])?;
    store.add_cities(vec![
        NewCity::new("Tokyo", Decimal::new(356897, 4), Decimal::new(1396922, 4), 1),
        NewCity::new("São Paulo", Decimal::new(-235504, 4), Decimal::new(-466339, 4), 2),
        NewCity::new("Osaka", Decimal::new(346936, 4), Decimal::new(1355019, 4), 1),
        NewCity::new("Sapporo", Decimal::new(430621, 4), Decimal::new(1413544, 4), 1),
        NewCity::new("Rio de Janeiro", Decimal::new(-229083, 4), Decimal::new(-431964, 4), 2),
    ])?;
    Ok(store)
}

#[tokio::test]
async fn second_page_of_countries_sorted_by_name() -> Result<()> {
    // reversed so the sort actually has work to do
    let mut countries = letters(25);
    countries.reverse();

    let request = PageRequest::new(1, 10).sort("Name", "ASC");
    let page: PageResult<Country> = shape(&countries, request).await?;

    let names: Vec<_> = page.data.iter().map(|c| c.name.as_str()).collect();
    let expected: Vec<_> = ('K'..='T').map(|ch| format!("{ch}land")).collect();
    assert_eq!(names, expected);
    assert_eq!(page.total_count, 25);
    assert_eq!(page.total_pages(), 3);
    assert!(page.has_previous_page());
    assert!(page.has_next_page());

    let body = serde_json::to_value(&page)?;
    assert_eq!(body["sortColumn"], json!("Name"));
    assert_eq!(body["sortOrder"], json!("ASC"));
    assert_eq!(body["totalPages"], json!(3));
    assert_eq!(body["filterColumn"], json!(null));
    Ok(())
}

#[tokio::test]
async fn item_count_matches_window_arithmetic() -> Result<()> {
    for total in [0usize, 1, 9, 10, 11, 25] {
        let countries = letters(total);
        for page_size in [1i64, 3, 10, 30] {
            for page_index in 0i64..5 {
                let page: PageResult<Country> =
                    shape(&countries, PageRequest::new(page_index, page_size)).await?;
                let remaining = (total as i64 - page_index * page_size).max(0);
                assert_eq!(page.data.len() as i64, remaining.min(page_size));
                assert_eq!(page.total_count, total as i64);
                assert_eq!(page.total_pages(), (total as i64 + page_size - 1) / page_size);
                if total == 0 {
                    assert!(!page.has_next_page());
                    assert_eq!(page.has_previous_page(), page_index > 0);
                }
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn page_past_the_end_is_empty_but_keeps_totals() -> Result<()> {
    let countries = letters(25);
    let page: PageResult<Country> = shape(&countries, PageRequest::new(7, 10)).await?;
    assert!(page.data.is_empty());
    assert_eq!(page.total_count, 25);
    assert_eq!(page.total_pages(), 3);
    assert!(page.has_previous_page());
    assert!(!page.has_next_page());
    Ok(())
}

#[tokio::test]
async fn numeric_sort_reverses_with_direction() -> Result<()> {
    let store = seeded_cities()?;
    let asc: PageResult<City> = shape(&store, PageRequest::new(0, 10).sort("lat", "asc")).await?;
    let desc: PageResult<City> = shape(&store, PageRequest::new(0, 10).sort("LAT", "DESC")).await?;

    let mut reversed = desc.data.clone();
    reversed.reverse();
    assert_eq!(asc.data, reversed);
    assert_eq!(asc.data[0].name, "São Paulo");
    Ok(())
}

#[tokio::test]
async fn missing_or_unknown_direction_sorts_descending() -> Result<()> {
    let store = seeded_cities()?;
    let mut request = PageRequest::new(0, 10);
    request.sort_column = Some("name".into());
    let implicit: PageResult<City> = shape(&store, request).await?;
    let odd: PageResult<City> = shape(&store, PageRequest::new(0, 10).sort("name", "up")).await?;

    let names: Vec<_> = implicit.data.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Tokyo", "São Paulo", "Sapporo", "Rio de Janeiro", "Osaka"]);
    assert_eq!(implicit.data, odd.data);
    Ok(())
}

#[tokio::test]
async fn prefix_filter_counts_only_matching_rows() -> Result<()> {
    let store = seeded_cities()?;
    let request = PageRequest::new(0, 1).filter("name", "s").sort("name", "asc");
    let page: PageResult<City> = shape(&store, request).await?;

    assert_eq!(page.total_count, 2);
    assert_eq!(page.total_pages(), 2);
    assert_eq!(page.data[0].name, "Sapporo");
    assert_eq!(page.filter_query.as_deref(), Some("s"));

    let sensitive = Shaper::new().match_case(MatchCase::Sensitive);
    let page: PageResult<City> = sensitive
        .shape(&store, PageRequest::new(0, 10).filter("name", "s"))
        .await?;
    assert_eq!(page.total_count, 0);
    Ok(())
}

#[tokio::test]
async fn filter_query_is_matched_literally() -> Result<()> {
    let mut countries = letters(3);
    countries.push(Country {
        id: 4,
        name: "100% Island".into(),
        iso2: "PC".into(),
        iso3: "PCT".into(),
    });
    let page: PageResult<Country> =
        shape(&countries, PageRequest::new(0, 10).filter("name", "%")).await?;
    assert_eq!(page.total_count, 0);
    let page: PageResult<Country> =
        shape(&countries, PageRequest::new(0, 10).filter("name", "100%")).await?;
    assert_eq!(page.total_count, 1);
    Ok(())
}

#[tokio::test]
async fn unknown_filter_column_applies_no_filter() -> Result<()> {
    let countries = letters(12);
    let unfiltered: PageResult<Country> = shape(&countries, PageRequest::new(0, 5)).await?;
    for column in ["; DROP TABLE countries", "name ", "population", "Name--"] {
        let page: PageResult<Country> =
            shape(&countries, PageRequest::new(0, 5).filter(column, "A")).await?;
        assert_eq!(page.data, unfiltered.data);
        assert_eq!(page.total_count, 12);
        assert_eq!(page.filter_column.as_deref(), Some(column));
    }
    Ok(())
}

#[tokio::test]
async fn numeric_filter_column_is_rejected() -> Result<()> {
    let store = seeded_cities()?;
    let err = shape::<City, _>(&store, PageRequest::new(0, 10).filter("countryId", "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnfilterableField { record: "City", field: "countryId" }));
    assert!(err.is_client_error());
    Ok(())
}

#[tokio::test]
async fn sort_policy_decides_unknown_sort_columns() -> Result<()> {
    let countries = letters(4);
    let request = PageRequest::new(0, 10).sort("population", "asc");

    let err = shape::<Country, _>(&countries, request.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidField { record: "Country", .. }));

    let lenient = Shaper::new().policy(SortFieldPolicy::Lenient);
    let page: PageResult<Country> = lenient.shape(&countries, request).await?;
    let plain: PageResult<Country> = shape(&countries, PageRequest::new(0, 10)).await?;
    assert_eq!(page.data, plain.data);
    Ok(())
}

#[tokio::test]
async fn invalid_paging_is_rejected() -> Result<()> {
    let countries = letters(4);
    for (index, size) in [(-1, 10), (0, 0), (0, -5), (i64::MAX, 2)] {
        let err = shape::<Country, _>(&countries, PageRequest::new(index, size))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPageParameters { .. }), "{index}/{size}");
    }
    Ok(())
}

#[tokio::test]
async fn shaping_is_idempotent() -> Result<()> {
    let store = seeded_cities()?;
    let request = PageRequest::new(0, 2).sort("lon", "asc").filter("name", "s");
    let first: PageResult<City> = shape(&store, request.clone()).await?;
    let second: PageResult<City> = shape(&store, request).await?;
    assert_eq!(first, second);
    assert_eq!(first.total_count, 2);
    Ok(())
}

#[tokio::test]
async fn request_deserializes_from_camel_case() -> Result<()> {
    let request: PageRequest = serde_json::from_value(json!({
        "pageIndex": 1,
        "sortColumn": "name",
        "sortOrder": "asc",
        "filterColumn": "",
        "filterQuery": "x"
    }))?;
    assert_eq!(request.page_size, 10);

    // empty filter column counts as absent
    let countries = letters(15);
    let page: PageResult<Country> = shape(&countries, request).await?;
    assert_eq!(page.data.len(), 5);
    assert_eq!(page.data[0].name, "Kland");
    Ok(())
}

#[tokio::test]
async fn extreme_page_parameters_keep_envelope_consistent() -> Result<()> {
    let countries = letters(3);

    let page: PageResult<Country> = shape(&countries, PageRequest::new(0, i64::MAX)).await?;
    assert_eq!(page.data.len(), 3);
    assert_eq!(page.total_pages(), 1);
    assert!(!page.has_next_page());

    let page: PageResult<Country> = shape(&countries, PageRequest::new(i64::MAX, 1)).await?;
    assert!(page.data.is_empty());
    assert_eq!(page.total_pages(), 3);
    assert!(page.has_previous_page());
    assert!(!page.has_next_page());

    let body = serde_json::to_value(&page)?;
    assert_eq!(body["hasNextPage"], json!(false));
    Ok(())
}
