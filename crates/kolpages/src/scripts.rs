//! Script text for DOM removals and keyboard emulation.
//!
//! Every removal script is an IIFE that returns the number of nodes it
//! removed, so surfaces always get a concrete value back. User-supplied text
//! is embedded as a JSON string literal, never spliced raw.

use crate::types::RemovalDirective;

/// JSON-encode a string so it can be embedded as a JS literal.
fn js_literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Script for a single removal directive.
pub fn removal_script(directive: &RemovalDirective) -> String {
    match directive {
        RemovalDirective::ById(id) => remove_by_id(id),
        RemovalDirective::BySelector(selector) => remove_by_selector(selector),
    }
}

pub fn remove_by_id(id: &str) -> String {
    format!(
        r#"(function() {{
    var element = document.getElementById({id});
    if (element && element.parentNode) {{
        element.parentNode.removeChild(element);
        return 1;
    }}
    return 0;
}})()"#,
        id = js_literal(id)
    )
}

pub fn remove_by_selector(selector: &str) -> String {
    format!(
        r#"(function() {{
    var removed = 0;
    var elements;
    try {{
        elements = document.querySelectorAll({selector});
    }} catch (e) {{
        return 0;
    }}
    for (var i = 0; i < elements.length; i++) {{
        var element = elements[i];
        if (element && element.parentNode) {{
            element.parentNode.removeChild(element);
            removed++;
        }}
    }}
    return removed;
}})()"#,
        selector = js_literal(selector)
    )
}

/// Remove the first `.MainBt` button whose `onclick` attribute equals `value`.
pub fn remove_by_onclick(value: &str) -> String {
    format!(
        r#"(function() {{
    var elements = document.querySelectorAll('.MainBt');
    for (var i = 0; i < elements.length; i++) {{
        var element = elements[i];
        if (element.getAttribute('onclick') === {value} && element.parentNode) {{
            element.parentNode.removeChild(element);
            return 1;
        }}
    }}
    return 0;
}})()"#,
        value = js_literal(value)
    )
}

/// Remove the first `.top-nav__item` whose anchor `href` equals `href`.
pub fn remove_by_href(href: &str) -> String {
    format!(
        r#"(function() {{
    var elements = document.querySelectorAll('.top-nav__item');
    for (var i = 0; i < elements.length; i++) {{
        var element = elements[i];
        var anchor = element.querySelector('a');
        if (anchor && anchor.getAttribute('href') === {href} && element.parentNode) {{
            element.parentNode.removeChild(element);
            return 1;
        }}
    }}
    return 0;
}})()"#,
        href = js_literal(href)
    )
}

pub fn insert_text(text: &str) -> String {
    format!(
        r#"(function() {{
    var focused = document.activeElement;
    if (focused && (focused.tagName === 'INPUT' || focused.tagName === 'TEXTAREA')) {{
        focused.value += {text};
        focused.dispatchEvent(new Event('input', {{ bubbles: true }}));
        focused.focus();
        return true;
    }}
    return false;
}})()"#,
        text = js_literal(text)
    )
}

pub fn delete_last_character() -> String {
    r#"(function() {
    var focused = document.activeElement;
    if (focused && (focused.tagName === 'INPUT' || focused.tagName === 'TEXTAREA') && focused.value.length > 0) {
        focused.value = focused.value.slice(0, -1);
        focused.dispatchEvent(new Event('input', { bubbles: true }));
        focused.focus();
        return true;
    }
    return false;
})()"#
        .to_string()
}

pub fn press_enter() -> String {
    r#"(function() {
    var focused = document.activeElement;
    if (!focused) {
        return false;
    }
    var init = { bubbles: true, cancelable: true, key: 'Enter', code: 'Enter', keyCode: 13, which: 13 };
    focused.dispatchEvent(new KeyboardEvent('keydown', init));
    focused.dispatchEvent(new KeyboardEvent('keypress', init));
    focused.dispatchEvent(new KeyboardEvent('keyup', init));
    focused.focus();
    return true;
})()"#
        .to_string()
}

pub fn history_back() -> &'static str {
    "(function() { if (window.history.length > 1) { window.history.back(); return true; } return false; })()"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_by_id_embeds_literal() {
        let js = remove_by_id("ad1");
        assert!(js.contains(r#"document.getElementById("ad1")"#));
    }

    #[test]
    fn test_selector_quotes_are_escaped() {
        let js = remove_by_selector(r#"a[href='x"y']"#);
        assert!(js.contains(r#"querySelectorAll("a[href='x\"y']")"#));
    }

    #[test]
    fn test_insert_text_escapes_payload() {
        let js = insert_text("it's </script>\n");
        assert!(js.contains(r#""it's </script>\n""#));
        assert!(!js.contains("it's </script>\n'"));
    }

    #[test]
    fn test_removal_script_dispatch() {
        assert_eq!(
            removal_script(&RemovalDirective::ById("x".into())),
            remove_by_id("x")
        );
        assert_eq!(
            removal_script(&RemovalDirective::BySelector(".x".into())),
            remove_by_selector(".x")
        );
    }

    #[test]
    fn test_structured_removals_target_expected_classes() {
        assert!(remove_by_onclick("go()").contains(".MainBt"));
        assert!(remove_by_href("/news").contains(".top-nav__item"));
    }
}
