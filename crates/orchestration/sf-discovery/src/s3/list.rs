//! Paginated object listing.

use futures::stream::Stream;
use sf_error::Result;
use sf_traits::{ListObjectsRequest, ObjectStore};
use sf_types::ObjectSummary;

/// Stream every object under `prefix`, following continuation tokens.
///
/// Pages are fetched lazily; a listing error ends the stream after yielding it.
pub fn list_all_objects<'a>(
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    prefix: Option<&'a str>,
    expected_bucket_owner: Option<&'a str>,
) -> impl Stream<Item = Result<ObjectSummary>> + Send + 'a {
    async_stream::try_stream! {
        let mut continuation_token: Option<String> = None;

        loop {
            let request = ListObjectsRequest::new(bucket)
                .with_prefix(prefix.map(str::to_string))
                .with_continuation_token(continuation_token.take())
                .with_expected_bucket_owner(expected_bucket_owner.map(str::to_string));

            let page = store.list_objects(&request).await?;
            for object in page.objects {
                yield object;
            }

            match page.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }
    }
}
