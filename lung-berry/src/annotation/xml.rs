//! LIDC XML 标注文件解析.
//!
//! 只关心元素的本地名, 因此与命名空间无关.

use super::{Annotation, Characteristics, Contour};
use crate::{PrepError, Result};
use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;

/// 一位放射科医生的阅片会话.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadingSession {
    /// `servicingRadiologistID`.
    pub reader_id: String,

    /// 该医生标注的全部结节 (不含 3mm 以下结节与非结节).
    pub annotations: Vec<Annotation>,
}

/// 单个 LIDC XML 文件的内容.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LidcXml {
    /// `ResponseHeader` 中的序列 UID.
    pub series_uid: Option<String>,

    /// 阅片会话, 按文件顺序排列.
    pub sessions: Vec<ReadingSession>,
}

impl LidcXml {
    /// 全部会话中的全部标注, 按会话顺序展开.
    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.sessions.iter().flat_map(|s| s.annotations.iter())
    }
}

#[derive(Default)]
struct NoduleBuilder {
    id: String,
    characteristics: Characteristics,
    has_characteristics: bool,
    contours: Vec<Contour>,
}

#[derive(Default)]
struct RoiBuilder {
    z: Option<f64>,
    sop_uid: String,
    inclusion: bool,
    points: Vec<(usize, usize)>,
    x: Option<usize>,
    y: Option<usize>,
}

fn bad(what: &str, text: &str) -> PrepError {
    PrepError::Annotation(format!("invalid {what}: `{text}`"))
}

fn parse_score(name: &str, text: &str) -> Result<u8> {
    // 个别文件的评分写作 "3.0".
    text.parse::<u8>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().map(|v| v.round() as u8))
        .ok_or_else(|| bad(name, text))
}

fn parse_coord(name: &str, text: &str) -> Result<usize> {
    text.parse::<usize>().map_err(|_| bad(name, text))
}

fn set_characteristic(c: &mut Characteristics, name: &str, v: u8) -> bool {
    let slot = match name {
        "subtlety" => &mut c.subtlety,
        "internalStructure" => &mut c.internal_structure,
        "calcification" => &mut c.calcification,
        "sphericity" => &mut c.sphericity,
        "margin" => &mut c.margin,
        "lobulation" => &mut c.lobulation,
        "spiculation" => &mut c.spiculation,
        "texture" => &mut c.texture,
        "malignancy" => &mut c.malignancy,
        _ => return false,
    };
    *slot = v;
    true
}

/// 解析 XML 字符串.
pub fn parse_lidc_xml_str(content: &str) -> Result<LidcXml> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut ans = LidcXml::default();
    let mut stack: Vec<String> = vec![];
    let mut session: Option<ReadingSession> = None;
    let mut nodule: Option<NoduleBuilder> = None;
    let mut roi: Option<RoiBuilder> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "readingSession" => session = Some(ReadingSession::default()),
                    "unblindedReadNodule" if session.is_some() => {
                        nodule = Some(NoduleBuilder::default())
                    }
                    "roi" if nodule.is_some() => roi = Some(RoiBuilder::default()),
                    _ => {}
                }
                stack.push(name);
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                let text = text.trim();
                let Some(name) = stack.last().map(String::as_str) else {
                    continue;
                };
                let parent = stack.len().checked_sub(2).map(|i| stack[i].as_str());

                if let Some(r) = roi.as_mut() {
                    match name {
                        "imageZposition" => {
                            r.z = Some(text.parse().map_err(|_| bad(name, text))?)
                        }
                        "imageSOP_UID" => r.sop_uid = text.to_owned(),
                        "inclusion" => r.inclusion = text.eq_ignore_ascii_case("true"),
                        "xCoord" => r.x = Some(parse_coord(name, text)?),
                        "yCoord" => r.y = Some(parse_coord(name, text)?),
                        _ => {}
                    }
                } else if let Some(n) = nodule.as_mut() {
                    if name == "noduleID" {
                        n.id = text.to_owned();
                    } else if parent == Some("characteristics") {
                        let v = parse_score(name, text)?;
                        n.has_characteristics |= set_characteristic(&mut n.characteristics, name, v);
                    }
                } else if let Some(s) = session.as_mut() {
                    if name == "servicingRadiologistID" {
                        s.reader_id = text.to_owned();
                    }
                } else if name.eq_ignore_ascii_case("SeriesInstanceUid") {
                    ans.series_uid = Some(text.to_owned());
                }
            }
            Event::End(e) => {
                stack.pop();
                match e.local_name().as_ref() {
                    b"edgeMap" => {
                        if let Some(r) = roi.as_mut() {
                            if let (Some(x), Some(y)) = (r.x.take(), r.y.take()) {
                                r.points.push((y, x));
                            }
                        }
                    }
                    b"roi" => {
                        if let (Some(r), Some(n)) = (roi.take(), nodule.as_mut()) {
                            let z = r.z.ok_or_else(|| {
                                PrepError::Annotation("roi without imageZposition".into())
                            })?;
                            n.contours.push(Contour {
                                z,
                                sop_uid: r.sop_uid,
                                inclusion: r.inclusion,
                                points: r.points,
                            });
                        }
                    }
                    b"unblindedReadNodule" => {
                        if let (Some(n), Some(s)) = (nodule.take(), session.as_mut()) {
                            if n.has_characteristics {
                                s.annotations.push(Annotation {
                                    reader_id: s.reader_id.clone(),
                                    nodule_id: n.id,
                                    characteristics: n.characteristics,
                                    contours: n.contours,
                                });
                            } else {
                                debug!("skip nodule `{}` without characteristics", n.id);
                            }
                        }
                    }
                    b"readingSession" => {
                        if let Some(s) = session.take() {
                            ans.sessions.push(s);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(ans)
}

/// 解析 `path` 处的 LIDC XML 文件.
pub fn parse_lidc_xml<P: AsRef<Path>>(path: P) -> Result<LidcXml> {
    let content = std::fs::read_to_string(path.as_ref())?;
    parse_lidc_xml_str(&content)
}
