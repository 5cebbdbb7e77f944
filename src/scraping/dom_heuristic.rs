use std::collections::{HashMap, HashSet};
use std::iter;

use ego_tree::NodeId;
use scraper::{ElementRef, Html};
use tracing::debug;

use super::base::{self, CardFields, ANCHOR_SELECTOR, CTA_RE, IMAGE_SELECTOR};
use super::{Payload, PayloadKind, SourceAdapter};
use crate::models::{AdapterId, RawCandidate};

pub const SIGNAL_TEXT_MIN: usize = 80;
pub const SIGNAL_TEXT_MAX: usize = 4000;
pub const CARD_TEXT_MIN: usize = 80;
pub const CARD_TEXT_MAX: usize = 3000;
pub const MAX_CARD_ASCENT: usize = 15;
pub const MAX_CONTAINER_ASCENT: usize = 20;
pub const LINK_CONTEXT_ASCENT: usize = 3;

/// Elements that count as the surrounding container of a bare link.
const LINK_CONTAINER_TAGS: &[&str] = &[
    "li", "article", "div", "section", "tr", "td", "dd", "figure", "aside",
];

/// Tunable limits of the card search. Lengths are in characters of visible text.
#[derive(Debug, Clone, Copy)]
pub struct DomBounds {
    pub signal_text_min: usize,
    pub signal_text_max: usize,
    pub card_text_min: usize,
    pub card_text_max: usize,
    pub max_card_ascent: usize,
    pub max_container_ascent: usize,
    pub link_context_ascent: usize,
}

impl Default for DomBounds {
    fn default() -> Self {
        Self {
            signal_text_min: SIGNAL_TEXT_MIN,
            signal_text_max: SIGNAL_TEXT_MAX,
            card_text_min: CARD_TEXT_MIN,
            card_text_max: CARD_TEXT_MAX,
            max_card_ascent: MAX_CARD_ASCENT,
            max_container_ascent: MAX_CONTAINER_ASCENT,
            link_context_ascent: LINK_CONTEXT_ASCENT,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Measure {
    chars: usize,
    signals: bool,
    cta: bool,
}

/// Memoized visible-text measurements per element.
#[derive(Default)]
struct TextMeasure {
    cache: HashMap<NodeId, Measure>,
}

impl TextMeasure {
    fn measure(&mut self, element: ElementRef<'_>) -> Measure {
        *self.cache.entry(element.id()).or_insert_with(|| {
            let text = base::text_lines(element).join("\n");
            Measure {
                chars: text.chars().count(),
                signals: base::has_event_signals(&text),
                cta: CTA_RE.is_match(&text),
            }
        })
    }
}

fn ancestors<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.ancestors().filter_map(ElementRef::wrap)
}

fn depth(element: ElementRef<'_>) -> usize {
    element.ancestors().count()
}

fn elements<'a>(document: &'a Html) -> impl Iterator<Item = ElementRef<'a>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
}

/// Card detection over rendered markup: finds blocks that show a price, a
/// date and a ticket button, keeps the ones in the main listing, and reads
/// each card line by line.
pub struct DomHeuristic {
    site_url: String,
    bounds: DomBounds,
}

impl DomHeuristic {
    pub fn new(site_url: &str, bounds: DomBounds) -> Self {
        Self {
            site_url: site_url.to_string(),
            bounds,
        }
    }

    fn within(chars: usize, min: usize, max: usize) -> bool {
        chars >= min && chars <= max
    }

    /// Smallest elements carrying all three signals, in document order.
    fn card_roots<'a>(&self, document: &'a Html, texts: &mut TextMeasure) -> Vec<ElementRef<'a>> {
        let b = self.bounds;
        let mut found: HashSet<NodeId> = HashSet::new();

        for element in elements(document) {
            let p = texts.measure(element);
            if !(p.signals && Self::within(p.chars, b.signal_text_min, b.signal_text_max)) {
                continue;
            }
            let root = iter::once(element)
                .chain(ancestors(element))
                .take(b.max_card_ascent + 1)
                .find(|candidate| {
                    let p = texts.measure(*candidate);
                    p.signals && Self::within(p.chars, b.card_text_min, b.card_text_max)
                });
            if let Some(root) = root {
                found.insert(root.id());
            }
        }

        let roots: Vec<ElementRef<'a>> = elements(document)
            .filter(|el| found.contains(&el.id()))
            .collect();
        let enclosing: HashSet<NodeId> = roots
            .iter()
            .flat_map(|root| ancestors(*root))
            .map(|el| el.id())
            .filter(|id| found.contains(id))
            .collect();

        roots
            .into_iter()
            .filter(|root| !enclosing.contains(&root.id()))
            .collect()
    }

    /// Each card votes for its nearest ancestor that encloses another card,
    /// and the container with the most votes seeds the main list. The list
    /// then widens to enclosing containers for as long as every card they add
    /// sits at the same depth as a card already in it, which takes in sibling
    /// rows of a grid but stops at stray matches in navigation or footers.
    fn main_list<'a>(&self, cards: &[ElementRef<'a>]) -> Vec<ElementRef<'a>> {
        let cap = self.bounds.max_container_ascent;
        let mut enclosed: HashMap<NodeId, usize> = HashMap::new();
        for card in cards {
            for ancestor in ancestors(*card).take(cap) {
                *enclosed.entry(ancestor.id()).or_default() += 1;
            }
        }

        let groups: Vec<Option<ElementRef<'a>>> = cards
            .iter()
            .map(|card| {
                ancestors(*card)
                    .take(cap)
                    .find(|ancestor| enclosed.get(&ancestor.id()).copied().unwrap_or(0) >= 2)
            })
            .collect();

        let mut votes: Vec<(ElementRef<'a>, usize)> = Vec::new();
        for group in groups.iter().flatten() {
            match votes.iter_mut().find(|(el, _)| el.id() == group.id()) {
                Some((_, count)) => *count += 1,
                None => votes.push((*group, 1)),
            }
        }
        let mut best: Option<(ElementRef<'a>, usize)> = None;
        for (el, count) in votes {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((el, count));
            }
        }
        let Some((seed, _)) = best else {
            return cards.to_vec();
        };

        let inside = |container: NodeId, card: ElementRef<'a>| {
            ancestors(card).take(cap).any(|el| el.id() == container)
        };
        let mut main = seed;
        let mut depths: HashSet<usize> = cards
            .iter()
            .filter(|card| inside(main.id(), **card))
            .map(|card| depth(*card))
            .collect();
        for ancestor in ancestors(seed).take(cap) {
            let added: Vec<usize> = cards
                .iter()
                .filter(|card| inside(ancestor.id(), **card) && !inside(main.id(), **card))
                .map(|card| depth(*card))
                .collect();
            if added.is_empty() {
                continue;
            }
            if !added.iter().all(|d| depths.contains(d)) {
                break;
            }
            depths.extend(added);
            main = ancestor;
        }

        cards
            .iter()
            .filter(|card| inside(main.id(), **card))
            .copied()
            .collect()
    }

    fn candidate(&self, title: String, fields: &CardFields, scope: ElementRef<'_>) -> RawCandidate {
        let mut raw = RawCandidate::new(AdapterId::DomHeuristic);
        raw.set("title", title);
        if let Some(date) = &fields.date {
            raw.set("date", date.as_str());
        }
        if let Some(price) = &fields.price {
            raw.set("priceText", price.as_str());
        }
        if let Some(location) = &fields.location {
            raw.set("location", location.as_str());
        }
        if let Some(url) = base::absolute_url(
            &self.site_url,
            base::first_attr(&scope, &ANCHOR_SELECTOR, "href"),
        ) {
            raw.set("url", url);
        }
        if let Some(image) = base::absolute_url(
            &self.site_url,
            base::first_attr(&scope, &IMAGE_SELECTOR, "src"),
        ) {
            raw.set("image", image);
        }
        raw
    }

    fn read_cards(&self, cards: &[ElementRef<'_>]) -> Vec<RawCandidate> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();

        for card in cards {
            let fields = base::classify_lines(&base::text_lines(*card));
            let Some(title) = fields.title.clone() else {
                continue;
            };
            let key = format!(
                "{}|{}",
                title.to_lowercase(),
                fields.date.as_deref().unwrap_or_default().to_lowercase()
            );
            if !seen.insert(key) {
                continue;
            }
            out.push(self.candidate(title, &fields, *card));
        }
        out
    }

    /// Looser pass: any titled link sitting next to a ticket button.
    fn link_pass(&self, document: &Html, texts: &mut TextMeasure) -> Vec<RawCandidate> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();

        for anchor in document.select(&ANCHOR_SELECTOR) {
            let text = base::inner_text(anchor);
            if text.is_empty() || base::is_boilerplate(&text) {
                continue;
            }
            let container = ancestors(anchor)
                .take(self.bounds.link_context_ascent)
                .find(|el| LINK_CONTAINER_TAGS.contains(&el.value().name()));
            let Some(container) = container else {
                continue;
            };
            let p = texts.measure(container);
            if !p.cta || p.chars > self.bounds.card_text_max {
                continue;
            }
            if !seen.insert(text.to_lowercase()) {
                continue;
            }

            let fields = base::classify_lines(&base::text_lines(container));
            let mut raw = self.candidate(text, &fields, container);
            if let Some(url) = base::absolute_url(
                &self.site_url,
                anchor.value().attr("href").map(str::to_string),
            ) {
                raw.set("url", url);
            }
            out.push(raw);
        }
        out
    }
}

impl SourceAdapter for DomHeuristic {
    fn adapter_id(&self) -> AdapterId {
        AdapterId::DomHeuristic
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Markup
    }

    fn extract(&self, payload: &Payload) -> Vec<RawCandidate> {
        let Payload::Markup(html) = payload else {
            return Vec::new();
        };
        let document = Html::parse_document(html);
        let mut texts = TextMeasure::default();

        let roots = self.card_roots(&document, &mut texts);
        let cards = self.main_list(&roots);
        debug!(
            card_roots = roots.len(),
            main_list = cards.len(),
            "dom heuristic cards"
        );

        let candidates = self.read_cards(&cards);
        if !candidates.is_empty() {
            return candidates;
        }
        let linked = self.link_pass(&document, &mut texts);
        debug!(count = linked.len(), "dom heuristic link pass");
        linked
    }
}
