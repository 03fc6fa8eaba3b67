//! Per-element computed style capture.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Evaluated in the page after the render has fired. Returns `{url, elements}`
/// for every element that can carry displayed text.
pub(crate) const COMPUTED_STYLES_SCRIPT: &str = r##"(() => {
  const skipped = new Set(["BASE", "HEAD", "HTML", "LINK", "META", "NOSCRIPT", "SCRIPT", "STYLE", "TITLE"]);
  const output = { url: String(location.href), elements: [] };
  for (const el of Array.from(document.getElementsByTagName("*"))) {
    if (skipped.has(el.nodeName)) {
      continue;
    }
    let text = el.textContent || "";
    for (const child of Array.from(el.childNodes)) {
      if (child.nodeName !== "#text" && child.textContent) {
        text = text.replace(child.textContent, "");
      }
    }
    text = text.replace(/\s*$/, "");

    const style = window.getComputedStyle(el, null);
    const computed = {};
    for (let i = 0; i < style.length; i++) {
      const name = style.item(i);
      computed[name] = style.getPropertyValue(name);
    }

    const parent = el.parentNode;
    output.elements.push({
      id: el.id || "",
      className: typeof el.className === "string" ? el.className : String(el.getAttribute("class") || ""),
      tagName: el.tagName,
      childNodes: el.childNodes.length,
      innerHTML: el.innerHTML,
      element_text: text,
      offsetHeight: el.offsetHeight || 0,
      offsetWidth: el.offsetWidth || 0,
      offsetTop: el.offsetTop || 0,
      offsetLeft: el.offsetLeft || 0,
      computedStyle: computed,
      parentTagName: parent && parent.tagName ? parent.tagName : null,
    });
  }
  return output;
})()"##;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputedStyles {
    pub url: String,
    #[serde(default)]
    pub elements: Vec<ElementStyle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementStyle {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class_name: String,
    pub tag_name: String,
    #[serde(default)]
    pub child_nodes: u32,
    #[serde(rename = "innerHTML", default)]
    pub inner_html: String,
    /// Text owned by the element itself, child element text removed.
    #[serde(rename = "element_text", default)]
    pub element_text: String,
    #[serde(default)]
    pub offset_height: f64,
    #[serde(default)]
    pub offset_width: f64,
    #[serde(default)]
    pub offset_top: f64,
    #[serde(default)]
    pub offset_left: f64,
    /// Property order as the engine enumerated it.
    #[serde(default)]
    pub computed_style: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub parent_tag_name: Option<String>,
}

impl ComputedStyles {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// JSON with a four-space indent.
    pub fn to_pretty_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
