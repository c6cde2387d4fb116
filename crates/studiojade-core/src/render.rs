//! Server-rendered HTML for the roster page and the contributors snippet.
//!
//! Pure functions of their inputs: the caller supplies the roster, the
//! current date and the site options. Every runtime value is written through
//! [`Markup`], which escapes it.

use time::macros::date;
use time::{Date, OffsetDateTime};

use crate::html::Markup;
use crate::roster::{Avatar, Roster, RosterEntry};

/// Day the studio was founded.
pub const FOUNDED: Date = date!(2024 - 02 - 16);

/// Avatars rendered with high loading priority (above the fold).
pub const EAGER_AVATARS: usize = 3;

/// Upper bound of the member-count progress bar.
pub const MEMBER_BAR_MAX: usize = 50;

/// Shown when a member has no avatar.
pub const PLACEHOLDER_AVATAR: &str = "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 48 48'><circle cx='24' cy='24' r='24' fill='%23dbdbdb'/><circle cx='24' cy='19' r='8' fill='%23ffffff'/><path d='M8 42a16 16 0 0 1 32 0' fill='%23ffffff'/></svg>";

const BULMA_CSS: &str = "https://cdn.jsdelivr.net/npm/bulma@1.0/css/bulma.min.css";

const PAGE_STYLES: &str = "
.member-grid .box { height: 100%; display: flex; align-items: center; gap: 0.75rem; }
.member-grid .box a { display: flex; align-items: center; gap: 0.75rem; color: inherit; }
.member-grid small { overflow-wrap: anywhere; }
.studio-age strong { font-size: 1.25rem; }
";

const TELEMETRY_SCRIPT_BODY: &str = r#";
var m={};var sent=false;
function device(){var w=window.innerWidth;return w<768?"mobile":(w<1024?"tablet":"desktop");}
function connection(){var c=navigator.connection;return c&&c.effectiveType?c.effectiveType:undefined;}
function observe(type,cb){try{new PerformanceObserver(function(l){cb(l.getEntries());}).observe({type:type,buffered:true});}catch(e){}}
try{var nav=performance.getEntriesByType("navigation")[0];if(nav){m.ttfb=nav.responseStart-nav.requestStart;}}catch(e){}
observe("paint",function(es){es.forEach(function(e){if(e.name==="first-contentful-paint")m.fcp=e.startTime;});});
observe("largest-contentful-paint",function(es){var last=es[es.length-1];if(last)m.lcp=last.startTime;});
observe("first-input",function(es){var e=es[0];if(e)m.fid=e.processingStart-e.startTime;});
var cls=0;observe("layout-shift",function(es){es.forEach(function(e){if(!e.hadRecentInput)cls+=e.value;});m.cls=cls;});
window.addEventListener("load",function(){try{var nav=performance.getEntriesByType("navigation")[0];if(nav&&nav.loadEventEnd>0)m.page_load=nav.loadEventEnd-nav.startTime;}catch(e){}});
function send(){if(sent)return;sent=true;m.device=device();m.connection=connection();var body=JSON.stringify(m);
if(navigator.sendBeacon){navigator.sendBeacon(endpoint,new Blob([body],{type:"application/json"}));}
else{fetch(endpoint,{method:"POST",headers:{"Content-Type":"application/json"},body:body,keepalive:true});}}
document.addEventListener("visibilitychange",function(){if(document.visibilityState==="hidden")send();});
window.addEventListener("pagehide",send);
})();
</script>
"#;

/// Site-level settings the page is rendered with.
#[derive(Debug, Clone)]
pub struct SiteOptions {
    pub title: String,
    pub studio_name: String,
    /// Prefix the numeric profile id is appended to.
    pub profile_base_url: String,
    /// Prefix the avatar asset id is appended to.
    pub avatar_base_url: String,
    /// Where the client telemetry script posts samples; `None` omits the script.
    pub telemetry_endpoint: Option<String>,
}

impl Default for SiteOptions {
    fn default() -> Self {
        Self {
            title: "StudioJade官方网站".into(),
            studio_name: "StudioJade".into(),
            profile_base_url: "https://40code.com/#page=user&id=".into(),
            avatar_base_url: "https://abc.520gxx.com/static/internalapi/asset/".into(),
            telemetry_endpoint: None,
        }
    }
}

impl SiteOptions {
    pub fn profile_url(&self, profile_id: i64) -> String {
        format!("{}{}", self.profile_base_url, profile_id)
    }

    /// Asset URL for an avatar, or the placeholder image.
    pub fn avatar_url(&self, avatar: &Avatar) -> String {
        match avatar {
            Avatar::Asset(id) => format!("{}{}", self.avatar_base_url, urlencoding::encode(id)),
            Avatar::Placeholder => PLACEHOLDER_AVATAR.to_string(),
        }
    }
}

/// Whole days since [`FOUNDED`]; zero before the founding date.
pub fn studio_age_days(as_of: Date) -> i64 {
    (as_of - FOUNDED).whole_days().max(0)
}

/// Bulma colour class for the member-count bar.
pub fn member_bar_class(count: usize) -> &'static str {
    match count {
        0..=5 => "is-link",
        6..=10 => "is-primary",
        11..=15 => "is-info",
        16..=20 => "is-success",
        21..=25 => "is-warning",
        _ => "is-danger",
    }
}

/// Render the full roster page.
pub fn render(roster: &Roster, as_of: OffsetDateTime, site: &SiteOptions) -> String {
    let mut page = Markup::with_capacity(4096 + roster.len() * 512);

    page.raw("<!DOCTYPE html>\n<html lang=\"zh-CN\">\n<head>\n")
        .raw("<meta charset=\"UTF-8\">\n")
        .raw("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n")
        .raw("<meta name=\"description\"")
        .attr("content", &format!("{} 成员列表", site.studio_name))
        .raw(">\n<title>")
        .text(&site.title)
        .raw("</title>\n")
        .raw("<link rel=\"preconnect\" href=\"https://cdn.jsdelivr.net\" crossorigin>\n")
        .raw("<link rel=\"stylesheet\"")
        .attr("href", BULMA_CSS)
        .raw(">\n<style>")
        .raw(PAGE_STYLES)
        .raw("</style>\n</head>\n<body>\n");

    render_nav(&mut page, site);

    let days = studio_age_days(as_of.date());
    let count = roster.len();

    page.raw("<section class=\"section\">\n<div class=\"container\">\n")
        .raw("<h1 class=\"title\">")
        .text(&site.title)
        .raw("</h1>\n<p class=\"studio-age\">")
        .text(&site.studio_name)
        .raw(" 已经成立 <strong>")
        .display(days)
        .raw("</strong> 天</p>\n")
        .raw("<h2 class=\"subtitle\">")
        .text(&site.studio_name)
        .raw("成员</h2>\n")
        .raw("<p>成员数量 ")
        .display(count)
        .raw("</p>\n<progress class=\"progress ")
        .raw(member_bar_class(count))
        .raw("\"")
        .attr("value", &count.to_string())
        .attr("max", &MEMBER_BAR_MAX.to_string())
        .raw(">")
        .display(count)
        .raw("</progress>\n")
        .raw("<div class=\"columns is-multiline is-mobile member-grid\">\n");

    for (index, entry) in roster.iter().enumerate() {
        render_card(&mut page, index, entry, site);
    }

    page.raw("</div>\n</div>\n</section>\n")
        .raw("<footer class=\"footer\"><div class=\"content has-text-centered\"><p>&copy; ")
        .text(&site.studio_name)
        .raw("</p></div></footer>\n");

    if let Some(endpoint) = &site.telemetry_endpoint {
        page.raw("<script>\n(function(){var endpoint=")
            .raw_json(endpoint)
            .raw(TELEMETRY_SCRIPT_BODY);
    }

    page.raw("</body>\n</html>\n");
    page.into_string()
}

fn render_nav(page: &mut Markup, site: &SiteOptions) {
    page.raw("<nav class=\"navbar is-light\" role=\"navigation\" aria-label=\"main navigation\">\n")
        .raw("<div class=\"navbar-brand\"><a class=\"navbar-item\" href=\"/\"><strong>")
        .text(&site.studio_name)
        .raw("</strong></a></div>\n")
        .raw("<div class=\"navbar-menu is-active\"><div class=\"navbar-start\">\n")
        .raw("<a class=\"navbar-item\" href=\"/\">成员</a>\n")
        .raw("<a class=\"navbar-item\" href=\"/contributors\">贡献者</a>\n")
        .raw("<a class=\"navbar-item\" href=\"/cm\">统计</a>\n")
        .raw("</div></div>\n</nav>\n");
}

fn render_card(page: &mut Markup, index: usize, entry: &RosterEntry, site: &SiteOptions) {
    page.raw("<div class=\"column is-half-mobile is-one-third-tablet is-one-quarter-desktop\">")
        .raw("<div class=\"box\"")
        .attr("data-member-id", &entry.profile_id.to_string())
        .raw(">\n<a")
        .attr("href", &site.profile_url(entry.profile_id))
        .raw(">\n<figure class=\"image is-48x48\"><img");

    match entry.avatar {
        Avatar::Asset(_) => page.raw(" class=\"is-rounded\""),
        Avatar::Placeholder => page.raw(" class=\"is-rounded avatar-placeholder\""),
    };

    page.attr("src", &site.avatar_url(&entry.avatar))
        .attr("alt", &entry.name)
        .raw(" width=\"48\" height=\"48\"");

    if index < EAGER_AVATARS {
        page.raw(" loading=\"eager\" fetchpriority=\"high\"");
    } else {
        page.raw(" loading=\"lazy\" decoding=\"async\"");
    }

    page.raw("></figure>\n<small>")
        .text(&entry.name)
        .raw("</small>\n</a>\n</div></div>\n");
}

/// Snippet embedding the contributor wall image.
pub fn render_contributors(image_url: &str, repository_url: &str) -> String {
    let mut page = Markup::with_capacity(512);
    page.raw("<!DOCTYPE html>\n<meta charset=\"UTF-8\">\n")
        .raw("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n")
        .raw("<link rel=\"stylesheet\"")
        .attr("href", BULMA_CSS)
        .raw(">\n<section class=\"section\">\n<h2 class=\"subtitle\">贡献者</h2>\n<a")
        .attr("href", repository_url)
        .raw(">\n<img")
        .attr("src", image_url)
        .raw(" alt=\"contributors\" loading=\"lazy\">\n</a>\n</section>\n");
    page.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::escape;
    use crate::roster::RosterResponse;
    use time::macros::datetime;

    fn example_roster() -> Roster {
        let body = r#"{"data":[{"nickname":"Alice","head":"abc123.png","id":1},{"nickname":"Bob","head":"None","id":2}]}"#;
        Roster::from(serde_json::from_str::<RosterResponse>(body).unwrap())
    }

    fn roster_of(n: usize) -> Roster {
        (0..n)
            .map(|i| RosterEntry {
                name: format!("member-{i}"),
                avatar: Avatar::Asset(format!("{i}.png")),
                profile_id: i as i64,
            })
            .collect()
    }

    #[test]
    fn test_studio_age_days() {
        assert_eq!(studio_age_days(date!(2024 - 03 - 16)), 29);
        assert_eq!(studio_age_days(date!(2024 - 02 - 16)), 0);
        assert_eq!(studio_age_days(date!(2025 - 02 - 16)), 366);
        assert_eq!(studio_age_days(date!(2023 - 01 - 01)), 0);
    }

    #[test]
    fn test_page_shows_studio_age() {
        let html = render(
            &Roster::empty(),
            datetime!(2024-03-16 12:00 UTC),
            &SiteOptions::default(),
        );
        assert!(html.contains("<strong>29</strong>"));
    }

    #[test]
    fn test_example_roster() {
        let site = SiteOptions::default();
        let html = render(&example_roster(), datetime!(2024-03-16 0:00 UTC), &site);

        assert_eq!(html.matches("data-member-id=").count(), 2);
        assert!(html.contains("https://abc.520gxx.com/static/internalapi/asset/abc123.png"));
        assert!(html.contains(&escape(PLACEHOLDER_AVATAR)));
        assert_eq!(html.matches("avatar-placeholder").count(), 1);
        assert!(html.contains("href=\"https://40code.com/#page=user&amp;id=1\""));
        assert!(html.contains("href=\"https://40code.com/#page=user&amp;id=2\""));
        assert!(html.contains("<small>Alice</small>"));
        assert!(html.contains("<small>Bob</small>"));
    }

    #[test]
    fn test_cards_follow_roster_order() {
        let roster = roster_of(7);
        let html = render(&roster, OffsetDateTime::UNIX_EPOCH, &SiteOptions::default());

        assert_eq!(html.matches("data-member-id=").count(), 7);
        let positions: Vec<usize> = (0..7)
            .map(|i| html.find(&format!("data-member-id=\"{i}\"")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_loading_hints() {
        let html = render(&roster_of(5), OffsetDateTime::UNIX_EPOCH, &SiteOptions::default());
        assert_eq!(html.matches("fetchpriority=\"high\"").count(), EAGER_AVATARS);
        assert_eq!(html.matches("loading=\"lazy\"").count(), 2);
    }

    #[test]
    fn test_names_are_escaped() {
        let roster: Roster = vec![RosterEntry {
            name: "<script>alert('x')</script>".into(),
            avatar: Avatar::Asset("\"><img src=x onerror=alert(1)>".into()),
            profile_id: 9,
        }]
        .into_iter()
        .collect();
        let html = render(&roster, OffsetDateTime::UNIX_EPOCH, &SiteOptions::default());

        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(!html.contains("onerror=alert(1)>"));
    }

    #[test]
    fn test_member_bar() {
        assert_eq!(member_bar_class(0), "is-link");
        assert_eq!(member_bar_class(5), "is-link");
        assert_eq!(member_bar_class(6), "is-primary");
        assert_eq!(member_bar_class(15), "is-info");
        assert_eq!(member_bar_class(20), "is-success");
        assert_eq!(member_bar_class(25), "is-warning");
        assert_eq!(member_bar_class(26), "is-danger");

        let html = render(&roster_of(12), OffsetDateTime::UNIX_EPOCH, &SiteOptions::default());
        assert!(html.contains("class=\"progress is-info\" value=\"12\" max=\"50\""));
    }

    #[test]
    fn test_telemetry_script_optional() {
        let mut site = SiteOptions::default();
        let html = render(&Roster::empty(), OffsetDateTime::UNIX_EPOCH, &site);
        assert!(!html.contains("<script>"));

        site.telemetry_endpoint = Some("/cm".into());
        let html = render(&Roster::empty(), OffsetDateTime::UNIX_EPOCH, &site);
        assert!(html.contains("var endpoint=\"/cm\";"));
        assert!(html.contains("PerformanceObserver"));
    }

    #[test]
    fn test_navigation_present() {
        let html = render(&Roster::empty(), OffsetDateTime::UNIX_EPOCH, &SiteOptions::default());
        assert!(html.contains("href=\"/contributors\""));
        assert!(html.contains("href=\"/cm\""));
        assert!(html.contains("bulma.min.css"));
    }

    #[test]
    fn test_contributors_snippet() {
        let html = render_contributors(
            "https://contrib.rocks/image?repo=StudioJade/website",
            "https://github.com/StudioJade/website",
        );
        assert!(html.contains("src=\"https://contrib.rocks/image?repo=StudioJade/website\""));
        assert!(html.contains("贡献者"));
    }
}
