//! 目录索引页解析
//!
//! 索引页是 IIS 风格的目录列表：`<pre>` 块中每条记录为
//! `日期 时间 AM/PM 大小 <a>文件名</a>`，开头可能有 `[To Parent Directory]` 链接。

use crate::error::{MirrorError, Result};
use regex::Regex;
use reqwest::Url;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});
static PRE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<pre[^>]*>(.*?)</pre>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

/// 上级目录伪条目，占 3 个 token
const PARENT_DIR: [&str; 3] = ["[To", "Parent", "Directory]"];
/// 普通记录占 5 个 token: date, time, meridiem, size, filename
const RECORD_SPAN: usize = 5;

/// 列表中一个文件的元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub filename: String,
    pub timestamp: String,
    pub size: String,
}

impl ListingEntry {
    fn from_window([date, time, meridiem, size, filename]: &[&str; RECORD_SPAN]) -> Result<Self> {
        if !meridiem.eq_ignore_ascii_case("AM") && !meridiem.eq_ignore_ascii_case("PM") {
            return Err(MirrorError::RemoteFormat(format!(
                "记录 {} 的第三个字段应为 AM/PM，实际为 {:?}",
                filename, meridiem
            )));
        }
        Ok(Self {
            filename: filename.to_string(),
            timestamp: format!("{} {} {}", date, time, meridiem),
            size: size.to_string(),
        })
    }
}

/// 提取所有文件链接：转换为绝对 URL，排除目录链接，去重并排序
pub fn extract_links(html: &str, base: &Url) -> Result<Vec<Url>> {
    let mut links = BTreeSet::new();

    for cap in HREF_RE.captures_iter(html) {
        let Some(href) = cap.get(1).or_else(|| cap.get(2)) else {
            continue;
        };
        let href = decode_entities(href.as_str().trim());
        // 目录、排序参数和页内锚点都不是文件
        if href.is_empty() || href.ends_with('/') || href.starts_with('?') || href.starts_with('#')
        {
            continue;
        }

        let url = base
            .join(&href)
            .map_err(|e| MirrorError::RemoteFormat(format!("无效链接 {:?}: {}", href, e)))?;
        // 解析后路径以 / 结尾（如裸主机名）也是目录
        if matches!(url.scheme(), "http" | "https") && !url.path().ends_with('/') {
            links.insert(url);
        }
    }

    Ok(links.into_iter().collect())
}

/// 解析 `<pre>` 列表为 文件名 -> 元数据
pub fn parse_listing(html: &str) -> Result<BTreeMap<String, ListingEntry>> {
    let block = PRE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| MirrorError::RemoteFormat("索引页中没有 <pre> 列表".to_string()))?;

    let text = decode_entities(&TAG_RE.replace_all(block.as_str(), " "));
    let tokens: Vec<&str> = text.split_whitespace().collect();

    let mut files = BTreeMap::new();
    for entry in ListingRecords::new(&tokens) {
        let entry = entry?;
        files.insert(entry.filename.clone(), entry);
    }
    Ok(files)
}

/// 把 token 序列切分为定长记录窗口
pub struct ListingRecords<'a> {
    tokens: &'a [&'a str],
    rest: &'a [&'a str],
}

impl<'a> ListingRecords<'a> {
    pub fn new(tokens: &'a [&'a str]) -> Self {
        Self {
            tokens,
            rest: tokens,
        }
    }

    fn offset(&self) -> usize {
        self.tokens.len() - self.rest.len()
    }
}

impl Iterator for ListingRecords<'_> {
    type Item = Result<ListingEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.rest.starts_with(&PARENT_DIR) {
            self.rest = &self.rest[PARENT_DIR.len()..];
        }
        if self.rest.is_empty() {
            return None;
        }

        match self.rest.split_first_chunk::<RECORD_SPAN>() {
            Some((window, tail)) => {
                self.rest = tail;
                Some(ListingEntry::from_window(window))
            }
            None => {
                let err = MirrorError::RemoteFormat(format!(
                    "位置 {} 处剩余 {} 个 token，不足一条 {} 字段记录: {:?}",
                    self.offset(),
                    self.rest.len(),
                    RECORD_SPAN,
                    self.rest
                ));
                // 出错后结束迭代
                self.rest = &[];
                Some(Err(err))
            }
        }
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
pub(crate) const SAMPLE_INDEX: &str = r#"<html><head><title>download.bls.gov - /pub/time.series/pr/</title></head><body><H1>download.bls.gov - /pub/time.series/pr/</H1><hr>

<pre><A HREF="/pub/time.series/">[To Parent Directory]</A><br><br> 3/13/2025  9:26 AM        179 <A HREF="/pub/time.series/pr/pr.class">pr.class</A><br> 3/13/2025  9:26 AM       1987 <A HREF="/pub/time.series/pr/pr.contacts">pr.contacts</A><br> 8/29/2025  8:30 AM    1052690 <A HREF="/pub/time.series/pr/pr.data.0.Current">pr.data.0.Current</A><br></pre><hr></body>
</html>"#;
