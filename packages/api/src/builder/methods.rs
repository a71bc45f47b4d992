//! Terminal methods that execute the built request.

use http::Method;
use peregrine_client::{IntoUrl, ReceivedResponse, RequestSpec, Result, StreamedResponse};

use super::core::RequestBuilder;

impl RequestBuilder {
    /// Execute as GET.
    pub async fn get(self, url: impl IntoUrl) -> Result<ReceivedResponse> {
        self.send(Method::GET, url).await
    }

    /// Execute as POST.
    pub async fn post(self, url: impl IntoUrl) -> Result<ReceivedResponse> {
        self.send(Method::POST, url).await
    }

    /// Execute as PUT.
    pub async fn put(self, url: impl IntoUrl) -> Result<ReceivedResponse> {
        self.send(Method::PUT, url).await
    }

    /// Execute as PATCH.
    pub async fn patch(self, url: impl IntoUrl) -> Result<ReceivedResponse> {
        self.send(Method::PATCH, url).await
    }

    /// Execute as DELETE.
    pub async fn delete(self, url: impl IntoUrl) -> Result<ReceivedResponse> {
        self.send(Method::DELETE, url).await
    }

    /// Execute as HEAD.
    pub async fn head(self, url: impl IntoUrl) -> Result<ReceivedResponse> {
        self.send(Method::HEAD, url).await
    }

    /// Execute as GET, streaming the response body instead of buffering it.
    pub async fn stream(self, url: impl IntoUrl) -> Result<StreamedResponse> {
        self.stream_with_method(Method::GET, url).await
    }

    /// Execute with an explicit method, streaming the response body.
    pub async fn stream_with_method(
        self,
        method: Method,
        url: impl IntoUrl,
    ) -> Result<StreamedResponse> {
        let client = self.client.clone();
        let configure = self.into_configure(method);
        client.request_stream(url, configure).await
    }

    /// Execute with an explicit method.
    pub async fn send(self, method: Method, url: impl IntoUrl) -> Result<ReceivedResponse> {
        let client = self.client.clone();
        let configure = self.into_configure(method);
        client.request(url, configure).await
    }

    fn into_configure(self, method: Method) -> impl FnOnce(&mut RequestSpec) {
        let Self {
            client: _,
            headers,
            body,
            timeout,
            follow_redirects,
            max_redirects,
        } = self;
        move |spec: &mut RequestSpec| {
            spec.set_method(method);
            *spec.headers_mut() = headers;
            spec.set_body(body);
            if let Some(timeout) = timeout {
                spec.timeout(timeout);
            }
            if let Some(follow) = follow_redirects {
                spec.follow_redirects(follow);
            }
            if let Some(max) = max_redirects {
                spec.max_redirects(max);
            }
        }
    }
}
