//! The console page. Pure: everything shown comes in through `PageView`.

use crate::runner::RunState;
use crate::store::{DEFAULT_SCRIPT, FileEntry};

const TITLE: &str = "Device Console";

pub struct PageView<'a> {
    pub ip: &'a str,
    pub mode: &'a str,
    pub version: &'a str,
    pub status: &'a str,
    pub files: &'a [FileEntry],
    pub run: &'a RunState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusKind {
    Neutral,
    Ok,
    Err,
}

impl StatusKind {
    pub fn classify(status: &str) -> Self {
        if status.starts_with("OK:") {
            StatusKind::Ok
        } else if status.starts_with("ERR:") || status.starts_with("Exception") {
            StatusKind::Err
        } else {
            StatusKind::Neutral
        }
    }

    fn css_class(&self) -> &'static str {
        match self {
            StatusKind::Neutral => "status",
            StatusKind::Ok => "status ok",
            StatusKind::Err => "status err",
        }
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `IDLE`, or `ACTIVE · <latest>` with a live count when runs overlap.
pub fn runner_label(run: &RunState) -> String {
    match (&run.name, run.active) {
        (Some(name), true) if run.live > 1 => format!("ACTIVE · {} (+{} more)", name, run.live - 1),
        (Some(name), true) => format!("ACTIVE · {}", name),
        _ => "IDLE".to_string(),
    }
}

pub fn render_page(view: &PageView) -> String {
    let mut h = String::with_capacity(12 * 1024);
    h.push_str("<!doctype html><meta charset=\"utf-8\">");
    h.push_str("<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">");
    h.push_str(&format!("<title>{}</title>", TITLE));
    h.push_str(STYLE);

    h.push_str(&format!("<div class=\"wrap\"><h1 class=\"headline\">{}</h1>", TITLE));
    h.push_str(&format!(
        "<div class=\"meta\">Mode <b>{}</b> · IP <b>{}</b> · Runner <b>{}</b> · <span class=\"hint\">{}</span></div>",
        escape_html(view.mode),
        escape_html(view.ip),
        escape_html(&runner_label(view.run)),
        escape_html(view.version),
    ));

    let status = if view.status.is_empty() {
        "Ready.".to_string()
    } else {
        escape_html(view.status)
    };
    h.push_str(&format!(
        "<div class=\"{}\">{}</div>",
        StatusKind::classify(view.status).css_class(),
        status
    ));

    h.push_str("<div class=\"card\"><h3>Files</h3><div class=\"files\">");
    for file in view.files {
        push_file(&mut h, file);
    }
    h.push_str("</div></div>");

    h.push_str(&format!(
        concat!(
            "<div class=\"card\"><h3>Run existing</h3>",
            "<form method=\"GET\" action=\"/run\" class=\"row\">",
            "<input name=\"f\" type=\"text\" value=\"{0}\" placeholder=\"filename.lua\">",
            "<button type=\"submit\">Run</button>",
            "</form></div>",
        ),
        DEFAULT_SCRIPT
    ));

    h.push_str(&format!(
        concat!(
            "<div class=\"card\"><h3>Paste code, save &amp; run</h3>",
            "<form method=\"POST\" action=\"/save\" id=\"saveform\">",
            "<div class=\"row\">",
            "<label>Save as:</label><input name=\"name\" id=\"name\" type=\"text\" value=\"{0}\" required>",
            "<label><input type=\"checkbox\" name=\"run\" value=\"1\" checked> Run immediately (background)</label>",
            "<button class=\"accent\" type=\"submit\" id=\"saveBtn\">Save &amp; Run</button>",
            "<button type=\"submit\" id=\"saveOnly\">Save only</button>",
            "</div>",
            "<textarea name=\"code\" id=\"code\" placeholder=\"-- paste your Lua here\"></textarea>",
            "<div class=\"bar\"><span class=\"hint\">Ctrl/Cmd + S saves and runs</span>",
            "<span class=\"count\" id=\"count\">0 lines, 0 chars</span></div>",
            "</form></div>",
        ),
        DEFAULT_SCRIPT
    ));

    h.push_str("<div class=\"card\"><h3>Logs</h3><pre id=\"log\"></pre></div>");

    h.push_str(concat!(
        "<div class=\"card\"><h3>Shell</h3>",
        "<div class=\"row\"><span class=\"hint\">Lua. Shift+Enter or Ctrl/Cmd+Enter to run. ",
        "<code>:reset</code> clears state.</span></div>",
        "<textarea id=\"repl_in\" placeholder=\"print('hello')\"></textarea>",
        "<div class=\"bar\"><span class=\"hint\">&nbsp;</span><button id=\"repl_btn\" type=\"button\">Run</button></div>",
        "<pre id=\"repl_out\"></pre></div>",
    ));

    h.push_str("<div class=\"card\"><a href=\"/reset\">Hard reset</a></div>");
    h.push_str(SCRIPT);
    h.push_str("</div>");
    h
}

fn push_file(h: &mut String, file: &FileEntry) {
    let name = escape_html(&file.name);
    if file.protected {
        h.push_str(&format!(
            "<div class=\"file item\"><span class=\"name\">{}</span> <span class=\"size\">{} B</span></div>",
            name, file.size
        ));
    } else {
        // names are already restricted to [A-Za-z0-9._-], so they are safe inside the URL
        h.push_str(&format!(
            concat!(
                "<div class=\"file item\"><span class=\"name\">{0}</span> <span class=\"size\">{1} B</span> ",
                "<a class=\"danger\" href=\"/del?f={0}\" onclick=\"return confirm('Delete {0}?')\">delete</a></div>",
            ),
            name, file.size
        ));
    }
}

const STYLE: &str = concat!(
    "<style>",
    ":root{--bg:#0b0f14;--panel:#0f1520;--muted:#9fb1c7;--text:#e6edf3;--line:#243041;",
    "--accent:#6ea8fe;--ok:#3fb950;--err:#f85149}",
    "*,*::before,*::after{box-sizing:border-box}",
    "body{margin:0;background:var(--bg);color:var(--text);font:14px/1.5 ui-monospace,Menlo,Consolas,monospace}",
    ".wrap{max-width:1100px;margin:24px auto;padding:0 16px}",
    ".headline{font-size:20px;margin:0 0 14px}.meta{color:var(--muted);margin:6px 0 18px}",
    ".card{background:var(--panel);border:1px solid var(--line);border-radius:12px;padding:16px;margin:18px 0}",
    ".card h3{margin:0 0 10px}",
    "input[type=text]{width:260px;background:var(--bg);color:var(--text);border:1px solid var(--line);border-radius:8px;padding:.5rem}",
    "button{background:#0d1117;color:var(--text);border:1px solid var(--line);border-radius:10px;padding:.55rem .9rem;cursor:pointer}",
    ".accent{border-color:var(--accent)}a{color:var(--accent)}",
    ".row{display:flex;gap:12px;align-items:center;flex-wrap:wrap;margin:.4rem 0}",
    "textarea{display:block;width:100%;min-height:280px;background:#0a1018;color:var(--text);border:1px solid var(--line);border-radius:10px;padding:12px}",
    "pre#log,pre#repl_out{max-height:260px;overflow:auto;white-space:pre-wrap;background:#0a1018;border:1px solid var(--line);border-radius:10px;padding:12px;margin:0}",
    ".status{position:sticky;top:0;padding:10px 12px;border-radius:10px;border:1px solid var(--line)}",
    ".status.ok{border-color:var(--ok);color:var(--ok)}.status.err{border-color:var(--err);color:var(--err)}",
    ".files{display:grid;grid-template-columns:repeat(auto-fit,minmax(230px,1fr));gap:8px}",
    ".file.item{padding:10px 12px;border:1px solid var(--line);border-radius:10px}",
    ".file .size,.hint,.count{color:var(--muted);font-size:12px}",
    ".file .danger{color:var(--err);margin-left:8px}",
    ".bar{display:flex;justify-content:space-between;align-items:center;margin:6px 0}",
    "</style>",
);

const SCRIPT: &str = concat!(
    "<script>(function(){",
    "var code=document.getElementById('code'),count=document.getElementById('count');",
    "function upd(){var t=code.value;var n=(t.match(/\\n/g)||[]).length+(t.length?1:0);count.textContent=n+' lines, '+t.length+' chars';}",
    "code.addEventListener('input',upd);upd();",
    "document.addEventListener('keydown',function(e){if((e.ctrlKey||e.metaKey)&&e.key==='s'){e.preventDefault();document.getElementById('saveform').submit();}});",
    "var nameEl=document.getElementById('name');",
    "try{nameEl.value=localStorage.getItem('dc_name')||nameEl.value;code.value=localStorage.getItem('dc_code')||code.value;upd();",
    "nameEl.addEventListener('input',function(){localStorage.setItem('dc_name',nameEl.value)});",
    "code.addEventListener('input',function(){localStorage.setItem('dc_code',code.value)});}catch(e){}",
    "var runBox=document.querySelector('input[name=\"run\"]');",
    "document.getElementById('saveOnly').addEventListener('click',function(){if(runBox)runBox.checked=false;});",
    "var logEl=document.getElementById('log');",
    "function pollLog(){var x=new XMLHttpRequest();x.open('GET','/log',true);",
    "x.onreadystatechange=function(){if(x.readyState===4&&x.status===200){logEl.textContent=x.responseText;logEl.scrollTop=logEl.scrollHeight;}};x.send();}",
    "setInterval(pollLog,700);pollLog();",
    "var rin=document.getElementById('repl_in'),rout=document.getElementById('repl_out');",
    "function out(s){rout.textContent+=s;rout.scrollTop=rout.scrollHeight;}",
    "function runShell(){var src=rin.value;if(!src.trim())return;out('> '+src.replace(/\\n/g,'\\n. ')+'\\n');",
    "var x=new XMLHttpRequest();x.open('POST','/exec',true);x.setRequestHeader('Content-Type','application/x-www-form-urlencoded');",
    "x.onreadystatechange=function(){if(x.readyState!==4)return;",
    "if(x.status===200){out(x.responseText.replace(/^(OK|ERR)\\n/,''));}else{out('HTTP '+x.status+'\\n');}};",
    "x.send('code='+encodeURIComponent(src));}",
    "document.getElementById('repl_btn').addEventListener('click',runShell);",
    "rin.addEventListener('keydown',function(e){if(e.key==='Enter'&&(e.ctrlKey||e.metaKey||e.shiftKey)){e.preventDefault();runShell();}});",
    "})();</script>",
);
