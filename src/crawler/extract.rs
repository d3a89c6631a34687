//! Extraction rules
//!
//! One rule per task kind. Each takes the fetched bytes and the originating
//! task and returns the artifact key, the child tasks it discovered and the
//! metadata it read. Rules do no I/O; the only outside state they consult is
//! a [`KnownArtifacts`] lookup so a profile does not re-queue courses that
//! are already archived.
//!
//! | Task | Selector | Emits |
//! |------|----------|-------|
//! | Catalog | `select.urlselect option` | Semester (`categoryid`, `perpage=all`) |
//! | Semester | `a.aalink` → `/course/view.php?id=` | Course (enrolment page) |
//! | Course | `ul.teachers a` → `/user/profile.php?id=` | User (`showallcourses=1`) |
//! | User | `div.profile_tree > section` #2 anchors → `?course=` | Course, unless archived |

use crate::crawler::task::Task;
use crate::output::{CourseRecord, EntityRecord, ProfileFields, SemesterRecord, UserRecord};
use crate::state::{EntityKind, TaskKind};
use crate::storage::KnownArtifacts;
use crate::url::{portal_url, query_param, resolve_link, with_query_param};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

const CATEGORY_OPTION: &str = "select.urlselect option";
const CATEGORY_SELECT: &str = "select.urlselect";
const COURSE_ANCHOR: &str = "a.aalink[href]";
const COURSE_NAME: &str = "h3.coursename";
const TEACHER_LIST: &str = "ul.teachers";
const ANCHOR: &str = "a[href]";
const PAGE_HEADING: &str = ".page-header-headings";
const ROLE_DESCRIPTION: &str = ".userprofile .description";
const PROFILE_TREE: &str = "div.profile_tree";

const COURSE_VIEW_PATH: &str = "/course/view.php";
const PROFILE_PATH: &str = "/user/profile.php";

/// Separator between the semester, faculty and major parts of a category label
const LABEL_SEPARATOR: &str = " / ";

/// Errors that stop a document from being extracted at all
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    #[error("{task}: missing {what}")]
    MissingStructure { task: String, what: &'static str },

    #[error("invalid selector '{0}'")]
    Selector(&'static str),
}

/// Result of running an extraction rule
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Where the document is archived; None for the catalog page
    pub key: Option<(EntityKind, String)>,

    /// Newly discovered work
    pub children: Vec<Task>,

    /// Metadata read from the document
    pub records: Vec<EntityRecord>,

    /// Structure that was expected but absent; the document is still usable
    pub warnings: Vec<String>,
}

/// Parsed parts of a `"<Semester> / <Faculty> / <Major>"` category label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLabel {
    pub semester: String,
    pub faculty: String,
    pub major: String,
}

/// Normalizes extracted text: trims and collapses whitespace runs to one space
///
/// # Examples
///
/// ```
/// use lms_archive::crawler::normalize_text;
///
/// assert_eq!(normalize_text("  Khoa  Học\n Máy\tTính "), "Khoa Học Máy Tính");
/// ```
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits a category label into exactly three non-empty parts
///
/// The label is normalized first. Anything that does not split into exactly
/// three parts returns None; such categories are skipped, not errors. Slashes
/// without surrounding spaces (as in `2/2025-2026`) belong to a part.
pub fn split_category_label(label: &str) -> Option<CategoryLabel> {
    let normalized = normalize_text(label);
    let parts: Vec<String> = normalized
        .split(LABEL_SEPARATOR)
        .map(normalize_text)
        .collect();

    match parts.as_slice() {
        [semester, faculty, major]
            if !semester.is_empty() && !faculty.is_empty() && !major.is_empty() =>
        {
            Some(CategoryLabel {
                semester: semester.clone(),
                faculty: faculty.clone(),
                major: major.clone(),
            })
        }
        _ => None,
    }
}

/// Builds the enrolment-page URL a Course task fetches
pub fn course_url(base: &Url, course_id: &str) -> Option<Url> {
    portal_url(base, &format!("/enrol/index.php?id={}", course_id)).ok()
}

/// Builds the profile URL a User task fetches, listing every course
pub fn profile_url(base: &Url, user_id: &str) -> Option<Url> {
    portal_url(base, &format!("{}?id={}", PROFILE_PATH, user_id))
        .ok()
        .map(|url| with_query_param(&url, "showallcourses", "1"))
}

/// Runs the extraction rule for the task's kind
///
/// # Arguments
///
/// * `task` - The task the document was fetched for
/// * `body` - Raw document bytes
/// * `known` - Lookup of already archived artifacts
///
/// # Returns
///
/// * `Ok(Extraction)` - Key, children, metadata and soft warnings
/// * `Err(ExtractError)` - The document lacks the structure the rule needs
pub fn extract<K>(task: &Task, body: &[u8], known: &K) -> Result<Extraction, ExtractError>
where
    K: KnownArtifacts + ?Sized,
{
    let html = String::from_utf8_lossy(body);
    let document = Html::parse_document(&html);

    match task.kind {
        TaskKind::Catalog => extract_catalog(task, &document),
        TaskKind::Entity(EntityKind::Semester) => extract_semester(task, &document),
        TaskKind::Entity(EntityKind::Course) => extract_course(task, &document),
        TaskKind::Entity(EntityKind::User) => extract_user(task, &document, known),
    }
}

fn selector(css: &'static str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|_| ExtractError::Selector(css))
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_text(&element.text().collect::<String>())
}

fn first_text(document: &Html, css: &'static str) -> Result<Option<String>, ExtractError> {
    let sel = selector(css)?;
    Ok(document.select(&sel).next().map(element_text))
}

/// Catalog page: one Semester task per well-formed category option
fn extract_catalog(task: &Task, document: &Html) -> Result<Extraction, ExtractError> {
    let select_sel = selector(CATEGORY_SELECT)?;
    if document.select(&select_sel).next().is_none() {
        return Err(ExtractError::MissingStructure {
            task: task.to_string(),
            what: "category selector (select.urlselect)",
        });
    }

    let mut extraction = Extraction::default();
    let option_sel = selector(CATEGORY_OPTION)?;

    for option in document.select(&option_sel) {
        let label = element_text(option);
        let value = option.value().attr("value").unwrap_or("").trim();
        if label.is_empty() || value.is_empty() {
            continue;
        }

        let Some(parts) = split_category_label(&label) else {
            continue;
        };

        let Some(target) = resolve_link(&task.url, value) else {
            extraction
                .warnings
                .push(format!("category '{}' has unusable link '{}'", label, value));
            continue;
        };

        let Some(category_id) = query_param(&target, "categoryid") else {
            extraction
                .warnings
                .push(format!("category '{}' link has no categoryid: {}", label, target));
            continue;
        };

        let listing = with_query_param(&target, "perpage", "all");
        extraction.records.push(EntityRecord::Semester(SemesterRecord {
            category_id: category_id.clone(),
            semester: parts.semester,
            faculty: parts.faculty,
            major: parts.major,
            label,
        }));
        extraction
            .children
            .push(Task::new(EntityKind::Semester, category_id, listing));
    }

    Ok(extraction)
}

/// Semester listing: one Course task per course link
fn extract_semester(task: &Task, document: &Html) -> Result<Extraction, ExtractError> {
    let mut extraction = Extraction {
        key: Some((EntityKind::Semester, task.id.clone())),
        ..Extraction::default()
    };

    let anchor_sel = selector(COURSE_ANCHOR)?;
    for anchor in document.select(&anchor_sel) {
        let Some(target) = anchor
            .value()
            .attr("href")
            .and_then(|href| resolve_link(&task.url, href))
        else {
            continue;
        };
        if !target.path().contains(COURSE_VIEW_PATH) {
            continue;
        }
        let Some(course_id) = query_param(&target, "id") else {
            continue;
        };
        if let Some(url) = course_url(&target, &course_id) {
            extraction
                .children
                .push(Task::new(EntityKind::Course, course_id, url));
        }
    }

    Ok(extraction)
}

/// Course page: course name plus one User task per teacher
///
/// A missing teacher list is tolerated: the page is still archived, with a
/// warning and no children.
fn extract_course(task: &Task, document: &Html) -> Result<Extraction, ExtractError> {
    let mut extraction = Extraction {
        key: Some((EntityKind::Course, task.id.clone())),
        ..Extraction::default()
    };

    let name = first_text(document, COURSE_NAME)?.unwrap_or_default();
    let list_sel = selector(TEACHER_LIST)?;
    let anchor_sel = selector(ANCHOR)?;

    let mut teachers_text = String::new();
    let mut teacher_ids = Vec::new();

    match document.select(&list_sel).next() {
        None => extraction
            .warnings
            .push(format!("course {} has no teacher list", task.id)),
        Some(list) => {
            teachers_text = element_text(list);
            for anchor in list.select(&anchor_sel) {
                let Some(target) = anchor
                    .value()
                    .attr("href")
                    .and_then(|href| resolve_link(&task.url, href))
                else {
                    continue;
                };
                if !target.path().contains(PROFILE_PATH) {
                    continue;
                }
                let Some(user_id) = query_param(&target, "id") else {
                    continue;
                };
                let url = with_query_param(&target, "showallcourses", "1");
                teacher_ids.push(user_id.clone());
                extraction
                    .children
                    .push(Task::new(EntityKind::User, user_id, url));
            }
        }
    }

    extraction.records.push(EntityRecord::Course(CourseRecord {
        course_id: task.id.clone(),
        name,
        teachers_text,
        teacher_ids,
    }));

    Ok(extraction)
}

/// Direct `<section>` children of the profile tree
fn profile_sections<'a>(tree: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    tree.children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() == "section")
        .collect()
}

/// User page: profile fields plus one Course task per unarchived course
fn extract_user<K>(task: &Task, document: &Html, known: &K) -> Result<Extraction, ExtractError>
where
    K: KnownArtifacts + ?Sized,
{
    let mut extraction = Extraction {
        key: Some((EntityKind::User, task.id.clone())),
        ..Extraction::default()
    };

    let display_name = first_text(document, PAGE_HEADING)?.unwrap_or_default();
    let role = first_text(document, ROLE_DESCRIPTION)?.unwrap_or_default();

    let mut fields = ProfileFields::new();
    let mut course_ids = Vec::new();

    let tree_sel = selector(PROFILE_TREE)?;
    match document.select(&tree_sel).next() {
        None => extraction
            .warnings
            .push(format!("user {} has no profile tree", task.id)),
        Some(tree) => {
            let sections = profile_sections(tree);

            if let Some(details) = sections.first() {
                let dt_sel = selector("dt")?;
                let dd_sel = selector("dd")?;
                let labels: Vec<String> = details.select(&dt_sel).map(element_text).collect();
                let values: Vec<String> = details.select(&dd_sel).map(element_text).collect();
                if labels.len() != values.len() {
                    extraction.warnings.push(format!(
                        "user {} profile has {} labels but {} values; keeping the first {}",
                        task.id,
                        labels.len(),
                        values.len(),
                        labels.len().min(values.len())
                    ));
                }
                fields = ProfileFields::zip(labels, values);
            }

            if let Some(courses) = sections.get(1) {
                let anchor_sel = selector(ANCHOR)?;
                for anchor in courses.select(&anchor_sel) {
                    let Some(target) = anchor
                        .value()
                        .attr("href")
                        .and_then(|href| resolve_link(&task.url, href))
                    else {
                        continue;
                    };
                    let Some(course_id) = query_param(&target, "course") else {
                        continue;
                    };
                    course_ids.push(course_id.clone());

                    if known.is_archived(EntityKind::Course, &course_id) {
                        continue;
                    }
                    if let Some(url) = course_url(&target, &course_id) {
                        extraction
                            .children
                            .push(Task::new(EntityKind::Course, course_id, url));
                    }
                }
            }
        }
    }

    extraction.records.push(EntityRecord::User(UserRecord {
        user_id: task.id.clone(),
        display_name,
        role,
        fields,
        course_ids,
    }));

    Ok(extraction)
}
