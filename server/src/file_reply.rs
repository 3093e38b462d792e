use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use tokio::fs::File;
use utoipa::{
    openapi::{
        self,
        content::ContentBuilder,
        schema::{KnownFormat, ObjectBuilder, Schema, SchemaFormat, Type},
        RefOr, ResponseBuilder,
    },
    ToResponse,
};

use crate::error::ServeError;
use crate::lock::SharedGuard;
use crate::reader_stream::LockedReaderStream;
use crate::resolver::{path_not_found, ResolvedFile};

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// A report file ready to be streamed under its report's shared lock.
pub struct FileReply {
    stream: LockedReaderStream,
    content_type: HeaderValue,
    disposition: HeaderValue,
    len: u64,
}

impl FileReply {
    /// Opens `resolved` while `guard` is held and prepares the headers.
    ///
    /// Resolution is repeated first, since the tree may have been rewritten
    /// while the request waited for the lock. The guard moves into the body
    /// stream, so the lock stays held until the response body is done.
    ///
    /// # Errors
    ///
    /// [`ServeError::NotFound`] when the file disappeared, turned into a
    /// directory or now resolves outside its report root,
    /// [`ServeError::Internal`] when it cannot be opened or its headers cannot
    /// be encoded.
    pub async fn open(resolved: ResolvedFile, guard: SharedGuard) -> Result<Self, ServeError> {
        let resolved = resolved.revalidate().await?;
        let not_found = || path_not_found(&resolved.relative);

        let file = match File::open(&resolved.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(ServeError::internal(e)),
        };
        let meta = file.metadata().await.map_err(ServeError::internal)?;
        if !meta.is_file() {
            return Err(not_found());
        }

        let name = name_from_path(&resolved.path.to_string_lossy()).to_owned();
        let mime = mime_guess::from_path(&resolved.path).first_or_octet_stream();
        let content_type = HeaderValue::from_str(mime.as_ref()).map_err(ServeError::internal)?;
        let disposition = content_disposition(&name)?;

        Ok(Self {
            stream: LockedReaderStream::new(file, meta.len(), resolved.relative, guard),
            content_type,
            disposition,
            len: meta.len(),
        })
    }
}

fn name_from_path(path: &str) -> &str {
    if let Some(ix) = path.rfind(['\\', '/']) {
        &path[ix + 1..]
    } else {
        path
    }
}

/// Plain `filename` for old clients plus RFC 6266 `filename*` carrying the
/// exact UTF-8 name.
fn content_disposition(name: &str) -> Result<HeaderValue, ServeError> {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = urlencoding::encode(name);
    let value = format!(r#"attachment; filename="{fallback}"; filename*=UTF-8''{encoded}"#);
    HeaderValue::from_str(&value).map_err(ServeError::internal)
}

impl IntoResponse for FileReply {
    fn into_response(self) -> Response {
        let mut res = Body::from_stream(self.stream).into_response();
        let headers = res.headers_mut();
        headers.insert(header::CONTENT_TYPE, self.content_type);
        headers.insert(header::CONTENT_DISPOSITION, self.disposition);
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.len));
        res
    }
}

impl ToResponse<'static> for FileReply {
    fn response() -> (&'static str, RefOr<openapi::Response>) {
        let object = ObjectBuilder::new()
            .schema_type(Type::String)
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::Binary)))
            .build();
        let content = ContentBuilder::new()
            .schema(Some(RefOr::T(Schema::Object(object))))
            .build();
        (
            "FileReply",
            ResponseBuilder::new()
                .description("Raw report file content, type detected from the file extension")
                .content("application/octet-stream", content)
                .build()
                .into(),
        )
    }
}
