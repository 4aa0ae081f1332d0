pub const DEFAULT_PAGE_SIZE: u32 = 30;

/// Query parameters of `GET /cities`.
///
/// Values are passed through as strings, exactly as the server encoded them in
/// its cursor links.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CityParams {
    pub filter: Option<String>,
    pub offset: Option<String>,
    pub limit: Option<String>,
}

impl CityParams {
    pub fn first_page(limit: u32) -> Self {
        Self {
            filter: None,
            offset: Some("0".to_string()),
            limit: Some(limit.to_string()),
        }
    }

    /// Overlay `filter` unless it is empty.
    pub fn with_filter(mut self, filter: Option<&str>) -> Self {
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            self.filter = Some(filter.to_string());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filter.is_none() && self.offset.is_none() && self.limit.is_none()
    }

    pub fn to_query(&self) -> Vec<(&'static str, &str)> {
        [
            ("offset", self.offset.as_deref()),
            ("limit", self.limit.as_deref()),
            ("filter", self.filter.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect()
    }
}

/// Extract pagination parameters from a cursor link such as
/// `/cities?offset=30&limit=30&filter=mad`.
///
/// Unknown keys are ignored, empty values are treated as absent and a link
/// without a query part yields empty params.
pub fn parse_link(link: &str) -> CityParams {
    let Some((_, query)) = link.split_once('?') else {
        return CityParams::default();
    };
    let query = query.split('#').next().unwrap_or_default();

    let mut params = CityParams::default();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        let slot = match key.as_ref() {
            "filter" => &mut params.filter,
            "offset" => &mut params.offset,
            "limit" => &mut params.limit,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }
    params
}
