use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Store,
    #[display("scan failed")]
    Scan,
    #[display("no folder {_0} under the backup root")]
    FolderNotFound(#[error(not(source))] String),
    #[display("job failed: {_0}")]
    JobFailed(#[error(not(source))] String),
    #[display("event stream closed before the job finished")]
    StreamClosed,
    #[display("cannot write output")]
    Output,
}
