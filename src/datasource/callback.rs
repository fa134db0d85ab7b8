use url::Url;

/// Query parameters that belong to the authorization response.
const RESPONSE_PARAMS: &[&str] = &[
    "code",
    "state",
    "session_state",
    "iss",
    "error",
    "error_description",
    "error_uri",
];

/// Authorization response parsed from the redirect URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse `url` as a redirect back to `redirect_uri`.
    ///
    /// Returns `None` when `url` is not at the redirect URI or carries neither
    /// `code` nor `error`.
    #[must_use]
    pub fn from_url(url: &Url, redirect_uri: &Url) -> Option<Self> {
        if url.origin() != redirect_uri.origin() || url.path() != redirect_uri.path() {
            return None;
        }

        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            slot.get_or_insert_with(|| value.into_owned());
        }

        (params.code.is_some() || params.error.is_some()).then_some(params)
    }
}

/// `url` without the authorization-response parameters, for history replacement.
#[must_use]
pub fn strip_callback_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !RESPONSE_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut stripped = url.clone();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirect() -> Url {
        "https://app.example.com/auth/callback".parse().unwrap()
    }

    #[test]
    fn parses_code_and_state() {
        let url: Url = "https://app.example.com/auth/callback?code=abc&state=xyz"
            .parse()
            .unwrap();
        let params = CallbackParams::from_url(&url, &redirect()).unwrap();
        assert_eq!(params.code.as_deref(), Some("abc"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert_eq!(params.error, None);
    }

    #[test]
    fn parses_error() {
        let url: Url =
            "https://app.example.com/auth/callback?error=access_denied&error_description=User%20denied"
                .parse()
                .unwrap();
        let params = CallbackParams::from_url(&url, &redirect()).unwrap();
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("User denied"));
    }

    #[test]
    fn ignores_other_pages() {
        let elsewhere: Url = "https://app.example.com/properties?code=abc&state=xyz"
            .parse()
            .unwrap();
        assert_eq!(CallbackParams::from_url(&elsewhere, &redirect()), None);

        let plain: Url = "https://app.example.com/auth/callback".parse().unwrap();
        assert_eq!(CallbackParams::from_url(&plain, &redirect()), None);
    }

    #[test]
    fn first_value_wins() {
        let url: Url = "https://app.example.com/auth/callback?code=a&code=b"
            .parse()
            .unwrap();
        let params = CallbackParams::from_url(&url, &redirect()).unwrap();
        assert_eq!(params.code.as_deref(), Some("a"));
    }

    #[test]
    fn strip_removes_response_params_only() {
        let url: Url = "https://app.example.com/auth/callback?tab=leases&code=abc&state=xyz&iss=x"
            .parse()
            .unwrap();
        assert_eq!(
            strip_callback_params(&url).as_str(),
            "https://app.example.com/auth/callback?tab=leases"
        );

        let bare: Url = "https://app.example.com/auth/callback?code=abc&state=xyz"
            .parse()
            .unwrap();
        assert_eq!(
            strip_callback_params(&bare).as_str(),
            "https://app.example.com/auth/callback"
        );
    }
}
