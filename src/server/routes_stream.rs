//! `GET /stream` and `GET /ext/stream`.
//!
//! Negotiation (target, authorization, transcoding, range, framing) happens
//! here on the async side so every rejection is a proper HTTP error. The
//! copy loop then runs as a [`StreamSession`] on the blocking pool, feeding
//! the response body through a channel.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};
use parking_lot::Mutex;
use serde::Deserialize;
use streamforged_common::{
    Error, MediaFile, MediaFileId, PlayQueue, Player, PlaylistId, SharedQueue, User,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::server::{AppContext, AppError};
use crate::streaming::content_type::{content_type, is_sonos, sonos_content_type};
use crate::streaming::{
    BandwidthLimiter, ChannelSink, Framing, HttpRange, QueueSource, StreamKind, StreamSession,
    Transfer, TranscodingOpener, ICY_METAINT,
};
use crate::transcoding::{effective_cap, TranscodeRequest, TranscodingParameters, DEFAULT_VIDEO_BIT_RATE};

/// Body chunks buffered between the copy loop and the connection.
const BODY_CHANNEL_CAPACITY: usize = 16;

const ICY_NOTICE: &str = "This stream requires a Shoutcast/Icecast compatible player.";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamParams {
    pub id: Option<String>,
    pub path: Option<String>,
    pub player: Option<String>,
    pub format: Option<String>,
    pub max_bit_rate: Option<u32>,
    #[serde(default)]
    pub hls: bool,
    pub time_offset: Option<u32>,
    pub duration: Option<u32>,
    /// Requested video frame size, `WxH`.
    pub size: Option<String>,
    /// Podcast playlist to stream in full.
    pub playlist: Option<String>,
    pub offset_seconds: Option<String>,
}

/// What a request streams.
#[derive(Debug)]
enum Target {
    Single(MediaFile),
    Podcast(Vec<MediaFile>),
    Queue,
}

impl Target {
    fn kind(&self) -> StreamKind {
        match self {
            Target::Single(_) => StreamKind::SingleFile,
            Target::Podcast(_) => StreamKind::Podcast,
            Target::Queue => StreamKind::Queue,
        }
    }
}

/// Negotiated response shape.
#[derive(Debug, PartialEq, Eq)]
struct Negotiated {
    status: StatusCode,
    framing: Framing,
    content_length: Option<u64>,
    content_range: Option<String>,
    accept_ranges: bool,
    /// Byte offset the source should start reading at.
    source_offset: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum Negotiation {
    Stream(Negotiated),
    Unsatisfiable { total: u64 },
}

pub async fn stream(
    State(ctx): State<AppContext>,
    connect: Option<ConnectInfo<SocketAddr>>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let permit = Arc::clone(&ctx.streams)
        .try_acquire_owned()
        .map_err(|_| Error::Unavailable("too many concurrent streams".into()))?;

    let client_addr = connect.map(|ConnectInfo(addr)| addr.ip().to_string());
    let player = ctx
        .players
        .resolve(params.player.as_deref(), client_addr.as_deref());
    let user = ctx.users.user(&player.username);

    let target = resolve_target(&ctx, &params)?;
    authorize(&ctx, &user, &player, &target)?;

    let kind = target.kind();
    let (queue, primary) = install_queue(&player, target);

    let request = transcode_request(&params, primary.as_ref(), &player, &user);
    let transcoding = primary
        .as_ref()
        .map(|file| ctx.resolver.resolve(file, &player, &user, &request));

    let shoutcast = header_str(&headers, "icy-metadata").is_some_and(|v| v.trim() == "1");
    let negotiation = match (&primary, &transcoding) {
        (Some(file), Some(transcoding)) => negotiate(
            kind,
            file,
            transcoding,
            header_str(&headers, header::RANGE.as_str()),
            params.offset_seconds.as_deref(),
            shoutcast,
        ),
        _ => unranged(shoutcast),
    };

    let Negotiated {
        status,
        framing,
        content_length,
        content_range,
        accept_ranges,
        source_offset,
    } = match negotiation {
        Negotiation::Stream(negotiated) => negotiated,
        Negotiation::Unsatisfiable { total } => {
            tracing::debug!(player = %player.id, total, "Requested range not satisfiable");
            return Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{total}"))
                .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
                .body(Body::empty())
                .map_err(|e| Error::Internal(e.to_string()).into());
        }
    };

    let transfer = Transfer::register(
        Arc::clone(&ctx.registry),
        Arc::clone(&ctx.stats),
        &player.id,
        &user.name,
        kind,
    );

    let opener = TranscodingOpener {
        resolver: Arc::clone(&ctx.resolver),
        player: Arc::clone(&player),
        user: user.clone(),
        request,
        program_overrides: ctx.program_overrides.to_vec(),
        stall_timeout: ctx.stall_timeout(),
    };
    let file_status = Arc::clone(transfer.status());
    let halt_status = Arc::clone(transfer.status());
    let source = QueueSource::new(Arc::clone(&queue), Box::new(opener))
        .with_start_offset(source_offset)
        .on_file_change(move |id| file_status.set_file(id))
        .halt_when(move || halt_status.is_terminated());

    // Open the first file (and start its transcoder) before answering so
    // failures are reported with a status code.
    let (source, skipped) = tokio::task::spawn_blocking(move || {
        let mut source = source;
        source.prime().map(|skipped| (source, skipped))
    })
    .await
    .map_err(|e| Error::Internal(format!("spawn_blocking join error: {e}")))?
    .map_err(open_error)?;

    let framing = match framing {
        Framing::Ranged {
            range,
            content_length,
            ..
        } => Framing::Ranged {
            range,
            start_offset: skipped,
            content_length,
        },
        other => other,
    };

    let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
    let session = StreamSession::new(
        source,
        ChannelSink::new(tx),
        framing,
        Arc::clone(&queue),
        transfer,
        ctx.session_settings(),
    )
    .with_limiter(BandwidthLimiter::new(ctx.config.streaming.download_limit_kbps))
    .with_cancellation(ctx.shutdown.child_token());

    tracing::info!(
        player = %player.id,
        user = %user.name,
        kind = ?kind,
        file = ?primary.as_ref().map(|f| f.id),
        status = %status,
        "Starting stream"
    );

    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        session.run()
    });

    let format = transcoding
        .as_ref()
        .map(|t| t.target_format.as_str())
        .unwrap_or("mp3");
    let sonos = is_sonos(
        player.client_id.as_deref(),
        header_str(&headers, header::USER_AGENT.as_str()),
    );
    let mime = if sonos {
        sonos_content_type(format)
    } else {
        content_type(format)
    };

    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, mime)
        .header(header::ACCEPT_RANGES, if accept_ranges { "bytes" } else { "none" })
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");

    if let Some(length) = content_length {
        response = response.header(header::CONTENT_LENGTH, length);
    }
    if let Some(content_range) = content_range {
        response = response.header(header::CONTENT_RANGE, content_range);
    }
    if let Some(file) = &primary {
        if accept_ranges {
            response = response.header(header::ETAG, format!("\"{}\"", file.id));
        }
        if let Some(duration) = file.duration_secs {
            response = response.header("X-Content-Duration", format!("{:.1}", f64::from(duration)));
        }
    }
    if shoutcast {
        let genre = primary
            .as_ref()
            .and_then(|f| f.genre.clone())
            .unwrap_or_else(|| "Mixed".to_string());
        response = response
            .header("icy-metaint", ICY_METAINT)
            .header("icy-name", ctx.config.server.name.as_str())
            .header("icy-genre", sanitize_header(&genre))
            .header("icy-url", ctx.public_url())
            .header("icy-notice1", ICY_NOTICE);
    }

    response
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .map_err(|e| Error::Internal(e.to_string()).into())
}

fn resolve_target(ctx: &AppContext, params: &StreamParams) -> Result<Target, Error> {
    if let Some(playlist) = non_empty(params.playlist.as_deref()) {
        let id: PlaylistId = playlist
            .parse()
            .map_err(|_| Error::validation(format!("invalid playlist id: {playlist}")))?;
        let files = ctx
            .library
            .playlist_files(id)
            .ok_or_else(|| Error::not_found("playlist", id))?;
        return Ok(Target::Podcast(files));
    }

    let file = if let Some(id) = non_empty(params.id.as_deref()) {
        let id: MediaFileId = id
            .parse()
            .map_err(|_| Error::validation(format!("invalid media file id: {id}")))?;
        ctx.library
            .media_file(id)
            .ok_or_else(|| Error::not_found("media_file", id))?
    } else if let Some(path) = non_empty(params.path.as_deref()) {
        ctx.library
            .media_file_by_path(std::path::Path::new(path))
            .ok_or_else(|| Error::not_found("media_file", path))?
    } else {
        return Ok(Target::Queue);
    };

    if file.is_directory {
        return Err(Error::validation(format!("{} is a directory", file.id)));
    }
    Ok(Target::Single(file))
}

fn authorize(ctx: &AppContext, user: &User, player: &Player, target: &Target) -> Result<(), Error> {
    match target {
        Target::Single(file) => ctx.access.authorize(user, file),
        Target::Podcast(files) => files.iter().try_for_each(|f| ctx.access.authorize(user, f)),
        Target::Queue => {
            let current = player.play_queue().lock().current().cloned();
            match current {
                Some(file) => ctx.access.authorize(user, &file),
                None if user.stream_role => Ok(()),
                None => Err(Error::Forbidden(format!(
                    "{} is not authorized to play files",
                    user.name
                ))),
            }
        }
    }
}

/// Pick the queue the session reads. Single files and podcasts get a
/// private queue; only queue streams read the player's live one.
fn install_queue(player: &Player, target: Target) -> (SharedQueue, Option<MediaFile>) {
    match target {
        Target::Single(file) => {
            let live = player.play_queue();
            let mut live = live.lock();
            if let Some(index) = live.index_of(file.id) {
                live.set_index(index);
            }
            drop(live);
            (
                Arc::new(Mutex::new(PlayQueue::single(file.clone()))),
                Some(file),
            )
        }
        Target::Podcast(files) => {
            let first = files.first().cloned();
            (Arc::new(Mutex::new(PlayQueue::from_files(files))), first)
        }
        Target::Queue => {
            let queue = player.play_queue();
            let current = queue.lock().current().cloned();
            (queue, current)
        }
    }
}

fn transcode_request(
    params: &StreamParams,
    primary: Option<&MediaFile>,
    player: &Player,
    user: &User,
) -> TranscodeRequest {
    let max_bit_rate = params.max_bit_rate.filter(|b| *b > 0);
    let video = primary.filter(|f| f.is_video()).map(|file| {
        let cap = effective_cap(&[
            max_bit_rate,
            Some(user.max_bit_rate),
            Some(player.max_bit_rate),
        ])
        .unwrap_or(DEFAULT_VIDEO_BIT_RATE);
        streamforged_media::video::video_settings(
            file,
            params.size.as_deref(),
            Some(cap),
            params.time_offset.unwrap_or(0),
            params.duration,
            params.hls,
        )
    });

    TranscodeRequest {
        max_bit_rate,
        format: params.format.clone(),
        video,
    }
}

fn unranged(shoutcast: bool) -> Negotiation {
    Negotiation::Stream(Negotiated {
        status: StatusCode::OK,
        framing: if shoutcast {
            Framing::Shoutcast {
                interval: ICY_METAINT,
            }
        } else {
            Framing::Plain {
                content_length: None,
            }
        },
        content_length: None,
        content_range: None,
        accept_ranges: false,
        source_offset: 0,
    })
}

/// Decide status, length and framing for a stream of `file`.
fn negotiate(
    kind: StreamKind,
    file: &MediaFile,
    transcoding: &TranscodingParameters,
    range_header: Option<&str>,
    offset_seconds: Option<&str>,
    shoutcast: bool,
) -> Negotiation {
    // Interleaved metadata changes the byte count, and queue streams have no
    // single length.
    if shoutcast || kind != StreamKind::SingleFile {
        return unranged(shoutcast);
    }

    // Transcoded output is promised its predicted length too; the session
    // pads or clips to it.
    let hls = transcoding.video.is_some_and(|v| v.hls);
    let full_length = transcoding.expected_length.filter(|_| !hls);

    let seekable = !file.is_video() && transcoding.range_allowed;
    let total = match transcoding.expected_length {
        Some(total) if seekable => total,
        _ => {
            return Negotiation::Stream(Negotiated {
                status: StatusCode::OK,
                framing: Framing::Plain {
                    content_length: full_length,
                },
                content_length: full_length,
                content_range: None,
                accept_ranges: false,
                source_offset: 0,
            })
        }
    };

    let range = range_header.and_then(HttpRange::parse).or_else(|| {
        offset_seconds.and_then(|o| HttpRange::from_offset_seconds(o, file.duration_secs, Some(total)))
    });

    let Some(range) = range else {
        return Negotiation::Stream(Negotiated {
            status: StatusCode::OK,
            framing: Framing::Plain {
                content_length: full_length,
            },
            content_length: full_length,
            content_range: None,
            accept_ranges: true,
            source_offset: 0,
        });
    };

    let Some(range) = range.clamp_to(total) else {
        return Negotiation::Unsatisfiable { total };
    };
    let length = range.len().unwrap_or(total - range.first());

    Negotiation::Stream(Negotiated {
        status: StatusCode::PARTIAL_CONTENT,
        framing: Framing::Ranged {
            range,
            start_offset: 0,
            content_length: length,
        },
        content_length: Some(length),
        content_range: Some(range.content_range(total)),
        accept_ranges: true,
        source_offset: if transcoding.is_transcoding() {
            0
        } else {
            range.first()
        },
    })
}

/// Map a failure to open the first file onto an HTTP error.
fn open_error(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        return Error::not_found("media file on disk", err);
    }
    let message = err.to_string();
    match err.into_inner().map(|inner| inner.downcast::<Error>()) {
        Some(Ok(inner)) => *inner,
        Some(Err(other)) => Error::tool("transcoder", other.to_string()),
        None => Error::Internal(format!("failed to open media file: {message}")),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn sanitize_header(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("Mixed"))
}
