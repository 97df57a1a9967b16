//! `GET /hls` and `GET /ext/hls`: `.m3u8` playlists for a media file.
//!
//! Several `bitRate` values give a variant playlist whose entries point back
//! at `/ext/hls` with one bitrate each; zero or one gives a media playlist of
//! `/ext/stream` segment URLs. Every embedded URL is signed.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::Query;
use chrono::{Duration, Utc};
use serde::Deserialize;
use streamforged_common::{Error, MediaFileId, PlayerId};
use streamforged_media::hls::{parse_bit_rates, BitRateSpec, Segment};

use crate::server::{AppContext, AppError};

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HlsParams {
    pub id: Option<String>,
    pub player: Option<String>,
    /// Repeated `bitRate=<kbps>[@<w>x<h>]`.
    #[serde(default)]
    pub bit_rate: Vec<String>,
}

pub async fn hls_playlist(
    State(ctx): State<AppContext>,
    Query(params): Query<HlsParams>,
) -> Result<impl IntoResponse, AppError> {
    let raw_id = params
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::validation("missing id"))?;
    let id: MediaFileId = raw_id
        .parse()
        .map_err(|_| Error::validation(format!("invalid media file id: {raw_id}")))?;
    let file = ctx
        .library
        .media_file(id)
        .ok_or_else(|| Error::not_found("media_file", id))?;
    if file.is_directory {
        return Err(Error::validation(format!("{id} is a directory")).into());
    }

    let player = ctx.players.resolve(params.player.as_deref(), None);
    let user = ctx.users.user(&player.username);
    ctx.access.authorize(&user, &file)?;

    let bit_rates = parse_bit_rates(&params.bit_rate)?;
    let urls = PlaylistUrls {
        base: ctx.public_url().to_string(),
        file: id,
        player: player.id.clone(),
    };
    let expires = Utc::now() + Duration::seconds(ctx.config.hls.url_expiry_secs as i64);

    let playlist = ctx.playlist_generator().generate(
        &file,
        &bit_rates,
        |spec| ctx.signer.sign(&urls.variant(spec), expires),
        |segment, spec| ctx.signer.sign(&urls.segment(segment, spec), expires),
    )?;

    tracing::debug!(
        file = %id,
        player = %player.id,
        bit_rates = bit_rates.len(),
        "Generated HLS playlist"
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        playlist.to_string(),
    ))
}

/// Unsigned URLs embedded in playlists.
struct PlaylistUrls {
    base: String,
    file: MediaFileId,
    player: PlayerId,
}

impl PlaylistUrls {
    fn player_param(&self) -> String {
        url::form_urlencoded::byte_serialize(self.player.as_str().as_bytes()).collect()
    }

    fn variant(&self, spec: &BitRateSpec) -> String {
        format!(
            "{}/ext/hls?id={}&player={}&bitRate={}",
            self.base,
            self.file,
            self.player_param(),
            spec
        )
    }

    fn segment(&self, segment: &Segment, spec: Option<&BitRateSpec>) -> String {
        let mut url = format!(
            "{}/ext/stream?id={}&player={}&hls=true&timeOffset={}&duration={}",
            self.base,
            self.file,
            self.player_param(),
            segment.offset,
            segment.duration
        );
        if let Some(spec) = spec {
            url.push_str(&format!("&maxBitRate={}", spec.kbps));
            if let Some(size) = spec.dimension {
                url.push_str(&format!("&size={size}"));
            }
        }
        url
    }
}
