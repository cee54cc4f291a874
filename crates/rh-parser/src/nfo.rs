//! Kodi-style `.nfo` sidecar parsing.
//!
//! The document's root element selects the [`NfoMetadata`] variant. Only the
//! fields the library uses are extracted; unknown elements are skipped.

use std::collections::BTreeMap;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use rh_core::metadata::{
    CommonMeta, EpisodeMeta, MovieMeta, MusicVideoMeta, PersonMeta, SeasonMeta, ShowMeta,
    StreamDetails, VideoDetail,
};
use rh_core::{AudioStream, Error, NfoMetadata, Result};

/// Values gathered while walking the document.
#[derive(Default)]
struct Collected {
    root: Option<String>,
    /// Direct children of the root, first text wins.
    scalars: BTreeMap<String, String>,
    genres: Vec<String>,
    studios: Vec<String>,
    unique_ids: BTreeMap<String, String>,
    streams: StreamDetails,
    saw_streams: bool,
}

impl Collected {
    fn scalar(&self, key: &str) -> Option<String> {
        self.scalars
            .get(key)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn number<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.scalar(key).and_then(|s| s.parse().ok())
    }

    fn common(&self) -> CommonMeta {
        let premiered = self.scalar("premiered");
        let year = self.number("year").or_else(|| {
            premiered
                .as_deref()
                .and_then(|p| p.get(..4))
                .and_then(|y| y.parse().ok())
        });
        CommonMeta {
            title: self.scalar("title"),
            original_title: self.scalar("originaltitle"),
            plot: self.scalar("plot"),
            year,
            premiered,
            runtime_minutes: self.number("runtime"),
            rating: self.number("rating"),
            genres: self.genres.clone(),
            studios: self.studios.clone(),
            unique_ids: self.unique_ids.clone(),
            stream_details: self.saw_streams.then(|| self.streams.clone()),
        }
    }

    fn into_metadata(self) -> Result<NfoMetadata> {
        let root = self
            .root
            .clone()
            .ok_or_else(|| Error::Validation("nfo has no root element".into()))?;
        let meta = match root.as_str() {
            "movie" => NfoMetadata::Movie(MovieMeta {
                common: self.common(),
            }),
            "tvshow" => NfoMetadata::Show(ShowMeta {
                common: self.common(),
            }),
            "episodedetails" => NfoMetadata::Episode(EpisodeMeta {
                common: self.common(),
                show_title: self.scalar("showtitle"),
                season: self.number("season"),
                episode: self.number("episode"),
                aired: self.scalar("aired"),
            }),
            "season" => NfoMetadata::Season(SeasonMeta {
                common: self.common(),
                season: self.number("seasonnumber").or_else(|| self.number("season")),
            }),
            "musicvideo" => NfoMetadata::MusicVideo(MusicVideoMeta {
                common: self.common(),
                artist: self.scalar("artist"),
                album: self.scalar("album"),
            }),
            "person" => NfoMetadata::Person(PersonMeta {
                name: self.scalar("name"),
                biography: self.scalar("biography"),
                birthdate: self.scalar("birthdate"),
            }),
            _ => {
                tracing::debug!(root = %root, "Unrecognized NFO root element");
                NfoMetadata::Unknown { root }
            }
        };
        Ok(meta)
    }

    /// Handle an opening tag; `stack` already includes it.
    fn open(&mut self, stack: &[String]) {
        if let [_, fileinfo, details, kind] = stack {
            if fileinfo == "fileinfo" && details == "streamdetails" {
                self.saw_streams = true;
                match kind.as_str() {
                    "video" => self.streams.video.push(VideoDetail::default()),
                    "audio" => {
                        let index = self.streams.audio.len();
                        self.streams.audio.push(AudioStream {
                            index,
                            ..Default::default()
                        });
                    }
                    _ => {}
                }
            }
        }
    }

    fn text(&mut self, stack: &[String], pending_uid: &mut Option<String>, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match stack {
            [_, field] => match field.as_str() {
                "genre" => self.genres.extend(split_list(text)),
                "studio" => self.studios.extend(split_list(text)),
                "uniqueid" => {
                    let kind = pending_uid.take().unwrap_or_else(|| "unknown".into());
                    self.unique_ids.insert(kind, text.to_string());
                }
                _ => {
                    self.scalars
                        .entry(field.clone())
                        .or_default()
                        .push_str(text);
                }
            },
            [_, ratings, _, value] if ratings == "ratings" && value == "value" => {
                self.scalars
                    .entry("rating".into())
                    .or_insert_with(|| text.to_string());
            }
            [_, fileinfo, details, kind, field]
                if fileinfo == "fileinfo" && details == "streamdetails" =>
            {
                self.stream_field(kind, field, text)
            }
            _ => {}
        }
    }

    fn stream_field(&mut self, kind: &str, field: &str, text: &str) {
        match kind {
            "video" => {
                if let Some(v) = self.streams.video.last_mut() {
                    match field {
                        "codec" => v.codec = Some(text.to_string()),
                        "width" => v.width = text.parse().ok(),
                        "height" => v.height = text.parse().ok(),
                        "durationinseconds" => v.duration_secs = text.parse().ok(),
                        _ => {}
                    }
                }
            }
            "audio" => {
                if let Some(a) = self.streams.audio.last_mut() {
                    match field {
                        "codec" => a.codec = Some(text.to_ascii_lowercase()),
                        "language" => a.language = Some(text.to_string()),
                        "channels" => a.channels = text.parse().ok(),
                        "title" => a.title = Some(text.to_string()),
                        _ => {}
                    }
                }
            }
            "subtitle" if field == "language" => {
                self.streams.subtitle_languages.push(text.to_string());
            }
            _ => {}
        }
    }
}

/// Genres and studios are sometimes packed as `"Drama / Crime"`.
fn split_list(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(" / ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase()
}

fn uniqueid_type(e: &BytesStart) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.local_name().as_ref() == b"type" {
            attr.unescape_value()
                .ok()
                .map(|v| v.trim().to_ascii_lowercase())
        } else {
            None
        }
    })
}

/// Parse an NFO document.
///
/// Malformed XML and documents without a root element are rejected with
/// [`Error::Validation`].
pub fn parse_nfo(xml: &str) -> Result<NfoMetadata> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut collected = Collected::default();
    let mut stack: Vec<String> = Vec::new();
    let mut pending_uid: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            Error::Validation(format!(
                "malformed nfo at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Start(e) => {
                let name = element_name(&e);
                if stack.is_empty() {
                    if collected.root.is_some() {
                        break;
                    }
                    collected.root = Some(name.clone());
                }
                if stack.len() == 1 && name == "uniqueid" {
                    pending_uid = uniqueid_type(&e);
                }
                stack.push(name);
                collected.open(&stack);
            }
            Event::Empty(e) => {
                let name = element_name(&e);
                if stack.is_empty() && collected.root.is_none() {
                    collected.root = Some(name);
                    continue;
                }
                stack.push(name);
                collected.open(&stack);
                stack.pop();
            }
            Event::End(_) => {
                stack.pop();
                if stack.is_empty() {
                    // Anything after the root (often a scraper URL) is ignored.
                    break;
                }
            }
            Event::Text(e) => {
                if stack.is_empty() {
                    continue;
                }
                let text = e
                    .unescape()
                    .map_err(|e| Error::Validation(format!("malformed nfo text: {e}")))?;
                collected.text(&stack, &mut pending_uid, &text);
            }
            Event::CData(e) => {
                if stack.is_empty() {
                    continue;
                }
                let raw = e.into_inner();
                let text = String::from_utf8_lossy(&raw);
                collected.text(&stack, &mut pending_uid, &text);
            }
            Event::Eof => {
                if !stack.is_empty() {
                    return Err(Error::Validation(format!(
                        "malformed nfo: unclosed <{}>",
                        stack.last().map(String::as_str).unwrap_or_default()
                    )));
                }
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    collected.into_metadata()
}

/// Read and parse an NFO file from disk.
pub fn parse_nfo_file(path: &Path) -> Result<NfoMetadata> {
    let xml = std::fs::read_to_string(path)?;
    parse_nfo(&xml).map_err(|e| match e {
        Error::Validation(msg) => Error::Validation(format!("{}: {msg}", path.display())),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPISODE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<episodedetails>
    <title>The Detail</title>
    <showtitle>The Wire</showtitle>
    <season>1</season>
    <episode>2</episode>
    <aired>2002-06-09</aired>
    <plot><![CDATA[McNulty & Greggs]]></plot>
    <uniqueid type="tvdb" default="true">77553</uniqueid>
    <fileinfo>
        <streamdetails>
            <video><codec>h264</codec><width>1920</width><height>1080</height></video>
            <audio><codec>AC3</codec><language>eng</language><channels>6</channels></audio>
            <audio><codec>aac</codec><language>ger</language><channels>2</channels></audio>
            <subtitle><language>eng</language></subtitle>
        </streamdetails>
    </fileinfo>
</episodedetails>
"#;

    #[test]
    fn episode_document() {
        let meta = parse_nfo(EPISODE).unwrap();
        assert_eq!(meta.kind(), "episode");
        assert_eq!(meta.title(), Some("The Detail"));
        assert_eq!(meta.episode_numbering(), Some((Some("The Wire"), 1, 2)));

        let NfoMetadata::Episode(ep) = &meta else {
            panic!("expected episode, got {meta:?}");
        };
        assert_eq!(ep.aired.as_deref(), Some("2002-06-09"));
        assert_eq!(ep.common.plot.as_deref(), Some("McNulty & Greggs"));
        assert_eq!(ep.common.unique_ids.get("tvdb").map(String::as_str), Some("77553"));

        let audio = meta.audio_streams();
        assert_eq!(audio.len(), 2);
        assert_eq!(audio[0].index, 0);
        assert_eq!(audio[0].codec.as_deref(), Some("ac3"));
        assert_eq!(audio[0].channels, Some(6));
        assert_eq!(audio[1].index, 1);
        assert_eq!(audio[1].language.as_deref(), Some("ger"));

        let sd = meta.stream_details().unwrap();
        assert_eq!(sd.video[0].width, Some(1920));
        assert_eq!(sd.subtitle_languages, vec!["eng"]);
    }

    #[test]
    fn movie_with_ratings_and_lists() {
        let xml = r#"<movie>
            <title>Heat</title>
            <originaltitle>Heat</originaltitle>
            <premiered>1995-12-15</premiered>
            <runtime>170</runtime>
            <ratings><rating name="imdb"><value>8.3</value></rating></ratings>
            <genre>Crime / Drama</genre>
            <genre>Thriller</genre>
            <studio>Warner Bros.</studio>
        </movie>"#;
        let NfoMetadata::Movie(m) = parse_nfo(xml).unwrap() else {
            panic!("expected movie");
        };
        assert_eq!(m.common.year, Some(1995));
        assert_eq!(m.common.runtime_minutes, Some(170));
        assert_eq!(m.common.rating, Some(8.3));
        assert_eq!(m.common.genres, vec!["Crime", "Drama", "Thriller"]);
        assert_eq!(m.common.studios, vec!["Warner Bros."]);
        assert!(m.common.stream_details.is_none());
    }

    #[test]
    fn root_selects_variant() {
        assert_eq!(parse_nfo("<tvshow><title>X</title></tvshow>").unwrap().kind(), "show");
        assert_eq!(
            parse_nfo("<season><seasonnumber>3</seasonnumber></season>").unwrap(),
            NfoMetadata::Season(SeasonMeta {
                season: Some(3),
                ..Default::default()
            })
        );
        assert_eq!(
            parse_nfo("<musicvideo><artist>A</artist></musicvideo>").unwrap().kind(),
            "music_video"
        );
        assert_eq!(parse_nfo("<person><name>P</name></person>").unwrap().title(), Some("P"));
        assert_eq!(
            parse_nfo("<artist><name>Band</name></artist>").unwrap(),
            NfoMetadata::Unknown {
                root: "artist".into()
            }
        );
        assert_eq!(parse_nfo("<movie/>").unwrap().kind(), "movie");
    }

    #[test]
    fn trailing_url_is_ignored() {
        let xml = "<movie><title>Heat</title></movie>\nhttps://www.themoviedb.org/movie/949";
        assert_eq!(parse_nfo(xml).unwrap().title(), Some("Heat"));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(
            parse_nfo("<movie><title>Heat</movie>"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(parse_nfo("<movie><title>Heat"), Err(Error::Validation(_))));
        assert!(matches!(parse_nfo("just text"), Err(Error::Validation(_))));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Heat.nfo");
        std::fs::write(&path, "<movie><title>Heat</title></movie>").unwrap();
        assert_eq!(parse_nfo_file(&path).unwrap().title(), Some("Heat"));
        assert!(parse_nfo_file(&dir.path().join("missing.nfo")).is_err());
    }
}
