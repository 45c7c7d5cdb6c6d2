//! Redirect policy and redirect hop construction

use reqwest::{
    header::{HeaderValue, REFERER, USER_AGENT},
    Body, Method, Request, StatusCode,
};
use url::Url;

use crate::{
    error::{HttpError, RedirectDenied, Result},
    options::{Options, RedirectCheck, DEFAULT_MAX_REDIRECTS},
};

/// Decides whether a redirect is followed
#[derive(Debug, Clone)]
pub enum RedirectPolicy {
    /// Caller-supplied check, used as is
    Custom(RedirectCheck),
    /// Follow up to `max` requests in a chain
    Limited { follow: bool, max: usize },
}

impl RedirectPolicy {
    pub fn from_options(options: &Options) -> Self {
        match &options.redirect_policy {
            Some(check) => RedirectPolicy::Custom(check.clone()),
            None => RedirectPolicy::Limited {
                follow: options.follow_location.unwrap_or(true),
                max: options.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS),
            },
        }
    }

    /// Check the pending request against the requests already issued.
    ///
    /// `via` is never empty when called by the client; it starts with the
    /// original request.
    pub fn check(
        &self,
        next: &mut Request,
        via: &[Request],
    ) -> std::result::Result<(), RedirectDenied> {
        let (follow, max) = match self {
            RedirectPolicy::Custom(check) => return check.check(next, via),
            RedirectPolicy::Limited { follow, max } => (*follow, *max),
        };

        if !follow || max == 0 {
            return Err(RedirectDenied::NotAllowed);
        }
        if via.len() >= max {
            return Err(RedirectDenied::LimitReached { hops: via.len() });
        }

        // only the user agent is carried over
        if let Some(user_agent) = via.last().and_then(|last| last.headers().get(USER_AGENT)) {
            next.headers_mut().insert(USER_AGENT, user_agent.clone());
        }

        Ok(())
    }
}

/// Body of a sent request, kept for 307/308 replays
pub(crate) enum BodyReplay {
    Empty,
    Reusable(Body),
    /// Streamed body that cannot be sent twice
    Streamed,
}

impl BodyReplay {
    pub(crate) fn of(request: &Request) -> Self {
        if request.body().is_none() {
            return BodyReplay::Empty;
        }
        match request.try_clone().and_then(|mut copy| copy.body_mut().take()) {
            Some(body) => BodyReplay::Reusable(body),
            None => BodyReplay::Streamed,
        }
    }
}

/// Build the follow-up request for a redirect response.
///
/// Returns `Ok(None)` when the response ends the chain: not a redirect
/// status, no `Location`, or a 307/308 whose body cannot be replayed.
pub(crate) fn next_request(
    previous: &Request,
    body: BodyReplay,
    status: StatusCode,
    location: Option<&HeaderValue>,
    auto_referer: bool,
) -> Result<Option<Request>> {
    let keeps_body = match status {
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER => false,
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => true,
        _ => return Ok(None),
    };

    let Some(location) = location else {
        return Ok(None);
    };
    let location = location
        .to_str()
        .map_err(|e| HttpError::InvalidUrl(format!("Location header: {e}")))?;
    let target = previous
        .url()
        .join(location)
        .map_err(|e| HttpError::InvalidUrl(format!("{location}: {e}")))?;

    let mut next = if keeps_body {
        let mut next = Request::new(previous.method().clone(), target);
        match body {
            BodyReplay::Empty => {}
            BodyReplay::Reusable(body) => *next.body_mut() = Some(body),
            BodyReplay::Streamed => return Ok(None),
        }
        next
    } else {
        let method = if previous.method() == Method::HEAD {
            Method::HEAD
        } else {
            Method::GET
        };
        Request::new(method, target)
    };

    if auto_referer {
        if let Some(referer) = referer_for(previous.url(), next.url()) {
            next.headers_mut().insert(REFERER, referer);
        }
    }

    Ok(Some(next))
}

/// Referer for a hop from `from` to `to`; none on an https to http downgrade
fn referer_for(from: &Url, to: &Url) -> Option<HeaderValue> {
    if from.scheme() == "https" && to.scheme() == "http" {
        return None;
    }
    let mut referer = from.clone();
    referer.set_fragment(None);
    let _ = referer.set_username("");
    let _ = referer.set_password(None);
    HeaderValue::from_str(referer.as_str()).ok()
}

/// Copy of a request's method, URL and headers, without its body
pub(crate) fn snapshot(request: &Request) -> Request {
    let mut copy = Request::new(request.method().clone(), request.url().clone());
    *copy.headers_mut() = request.headers().clone();
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::HttpOption;

    fn get(url: &str) -> Request {
        Request::new(Method::GET, Url::parse(url).unwrap())
    }

    fn chain(len: usize) -> Vec<Request> {
        (0..len).map(|i| get(&format!("http://example.com/{i}"))).collect()
    }

    #[test]
    fn test_defaults_follow_ten() {
        let policy = RedirectPolicy::from_options(&Options::new());
        assert!(matches!(policy, RedirectPolicy::Limited { follow: true, max: 10 }));
    }

    #[test]
    fn test_follow_location_false_denies_first_redirect() {
        let policy = RedirectPolicy::from_options(&Options::new().follow_location(false));
        let mut next = get("http://example.com/next");
        assert_eq!(
            policy.check(&mut next, &chain(1)),
            Err(RedirectDenied::NotAllowed)
        );
    }

    #[test]
    fn test_zero_limit_denies() {
        let policy = RedirectPolicy::from_options(&Options::new().max_redirects(0));
        let mut next = get("http://example.com/next");
        assert_eq!(
            policy.check(&mut next, &chain(1)),
            Err(RedirectDenied::NotAllowed)
        );
    }

    #[test]
    fn test_limit_counts_prior_requests() {
        let policy = RedirectPolicy::from_options(&Options::new().max_redirects(2));
        let mut next = get("http://example.com/next");

        assert_eq!(policy.check(&mut next, &chain(1)), Ok(()));
        assert_eq!(
            policy.check(&mut next, &chain(2)),
            Err(RedirectDenied::LimitReached { hops: 2 })
        );
    }

    #[test]
    fn test_only_user_agent_forwarded() {
        let policy = RedirectPolicy::from_options(&Options::new());
        let mut first = get("http://example.com/a");
        first
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static("agent/1.0"));
        first
            .headers_mut()
            .insert("x-custom", HeaderValue::from_static("kept-back"));

        let mut next = get("http://example.com/b");
        policy.check(&mut next, &[first]).unwrap();

        assert_eq!(next.headers().get(USER_AGENT).unwrap(), "agent/1.0");
        assert!(next.headers().get("x-custom").is_none());
    }

    #[test]
    fn test_custom_policy_bypasses_limits() {
        let check = RedirectCheck::new(|next, _via| {
            if next.url().path() == "/blocked" {
                Err(RedirectDenied::Custom("blocked path".into()))
            } else {
                Ok(())
            }
        });
        let options = Options::new()
            .follow_location(false)
            .with(HttpOption::RedirectPolicy(check));
        let policy = RedirectPolicy::from_options(&options);

        let mut allowed = get("http://example.com/fine");
        assert_eq!(policy.check(&mut allowed, &chain(50)), Ok(()));

        let mut blocked = get("http://example.com/blocked");
        assert_eq!(
            policy.check(&mut blocked, &chain(1)),
            Err(RedirectDenied::Custom("blocked path".into()))
        );
    }

    #[test]
    fn test_see_other_switches_to_get() {
        let mut post = Request::new(Method::POST, Url::parse("http://example.com/form").unwrap());
        *post.body_mut() = Some("a=1".into());
        let location = HeaderValue::from_static("/done");

        let body = BodyReplay::of(&post);
        let next = next_request(&post, body, StatusCode::SEE_OTHER, Some(&location), true)
            .unwrap()
            .unwrap();

        assert_eq!(next.method(), Method::GET);
        assert_eq!(next.url().as_str(), "http://example.com/done");
        assert!(next.body().is_none());
        assert_eq!(next.headers().get(REFERER).unwrap(), "http://example.com/form");
    }

    #[test]
    fn test_temporary_redirect_replays_body() {
        let mut post = Request::new(Method::POST, Url::parse("http://example.com/a").unwrap());
        *post.body_mut() = Some("payload".into());
        let body = BodyReplay::of(&post);
        assert!(matches!(body, BodyReplay::Reusable(_)));
        let location = HeaderValue::from_static("http://other.example.com/b");

        let next = next_request(&post, body, StatusCode::TEMPORARY_REDIRECT, Some(&location), false)
            .unwrap()
            .unwrap();

        assert_eq!(next.method(), Method::POST);
        assert_eq!(next.body().and_then(|b| b.as_bytes()), Some(&b"payload"[..]));
        assert!(next.headers().get(REFERER).is_none());
    }

    #[test]
    fn test_missing_location_ends_chain() {
        let req = get("http://example.com/a");
        assert!(next_request(&req, BodyReplay::Empty, StatusCode::FOUND, None, true)
            .unwrap()
            .is_none());
        assert!(next_request(&req, BodyReplay::Empty, StatusCode::OK, None, true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_no_referer_on_https_downgrade() {
        let from = Url::parse("https://secure.example.com/a").unwrap();
        let to = Url::parse("http://example.com/b").unwrap();
        assert!(referer_for(&from, &to).is_none());
        assert!(referer_for(&to, &from).is_some());
    }
}
