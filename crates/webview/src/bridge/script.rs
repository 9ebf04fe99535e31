//! Script sources the host injects into session content
//!
//! Everything interpolated into a script is embedded as a JSON literal, never
//! spliced in raw.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

use crate::engine::Point;

/// Wrap `source` so its completion value (or thrown error) is reported back
/// under `correlation`
pub fn wrap_evaluation(correlation: u64, source: &str) -> String {
    let id = Value::from(correlation.to_string());
    let source = Value::from(source);
    format!(
        "(function(){{\
var report=function(isError,value){{external.EvaluateCallback({id},isError,JSON.stringify(value===undefined?null:value));}};\
try{{report(false,(0,eval)({source}));}}\
catch(e){{report(true,String(e&&e.message!==undefined?e.message:e));}}\
}})();"
    )
}

/// Dispatch a `contextmenu` event at `at` in content coordinates
pub fn context_menu(at: Point) -> String {
    format!(
        "(function(){{try{{\
var x={x},y={y};\
var evt=new MouseEvent('contextmenu',{{bubbles:true,cancelable:true,view:window,clientX:x,clientY:y,button:2,buttons:2}});\
var el=document.elementFromPoint(x,y)||document.body||document;\
el.dispatchEvent(evt);\
}}catch(e){{console.error('contextmenu dispatch failed',e);}}}})();",
        x = at.x,
        y = at.y
    )
}

/// Bootstrap plus one global function per channel.
///
/// Calling `name(data, callback)` in content posts a channel invocation; the
/// callback, if any, waits for the host's answer under a numeric token.
pub fn install_channels(names: &[String]) -> String {
    let mut script = String::from(
        "(function(){\
if(!window.external){window.external={};}\
var ext=window.external;\
if(!ext.__channelCallbacks){\
ext.__channelCallbacks={};ext.__nextChannelToken=1;\
ext.RegisterCallback=function(fn){var t=ext.__nextChannelToken++;ext.__channelCallbacks[t]=fn;return t;};\
ext.CompleteCallback=function(t,isError,result){var fn=ext.__channelCallbacks[t];delete ext.__channelCallbacks[t];if(fn){fn(isError,result);}};\
}\
var bind=function(name){window[name]=function(data,callback){\
var token=typeof callback==='function'?String(ext.RegisterCallback(callback)):'';\
ext.JavaScriptChannel(name,typeof data==='string'?data:JSON.stringify(data===undefined?null:data),token);\
};};",
    );
    for name in names {
        script.push_str("bind(");
        script.push_str(&Value::from(name.as_str()).to_string());
        script.push_str(");");
    }
    script.push_str("})();");
    script
}

/// Document shown in place of a page that failed to load
pub fn error_page(failed_url: &str, error_text: &str, code: i32) -> String {
    format!(
        "<html><head><meta charset=\"utf-8\"></head><body bgcolor=\"white\">\
<h2>Failed to load URL {} with error {} ({}).</h2></body></html>",
        escape_html(failed_url),
        escape_html(error_text),
        code
    )
}

pub fn data_uri(content: &str, mime_type: &str) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(content))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
