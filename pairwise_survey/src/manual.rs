/*!

This is the long-form manual for `pairwise_survey` and `mbisurvey`.

## The survey

A respondent is shown two media outlets at a time and picks the one perceived as less biased,
or answers "don't know". The comparisons are grouped in sections, one per kind of media:

| id | type    | name                        |
|----|---------|-----------------------------|
| 1  | `tg`    | Telegiornali                |
| 2  | `talk`  | Talk show televisivi        |
| 3  | `press` | Quotidiani e testate online |
| 4  | `radio` | Programmi radiofonici       |
| 5  | `mixed` | Confronti misti             |

Each section has the same number of comparisons (6 by default), so a complete survey has
30 comparisons.

## Generating the pairs

For a section of a given type, only the outlets of that type are used.

1. The outlets are shuffled and taken two by two. In this first pass no outlet appears twice.
2. If more comparisons are needed, pairs are drawn from new permutations. A pair that was already
   produced (in either order) is redrawn, up to [`crate::MAX_REPEAT_ATTEMPTS`] times, after which
   it is accepted. With only two outlets A and B, all the comparisons of the section are A/B.

The `mixed` section confronts the mainstream outlets with the rest of the catalog. The
mainstream outlets are cycled through in random order, and each one is paired with an outlet
outside the mainstream set, preferably of a different type. The mainstream outlet is put on the
left or on the right at random. Every pair of that section contains exactly one mainstream
outlet.

A section that does not have enough outlets gets fewer comparisons, or none. This is reported in
the logs and does not stop the other sections. A catalog that yields no comparison at all cannot
start a survey ([`crate::SurveyError::NoComparisons`]).

The generation only depends on the random generator passed to [`crate::generate_pairs`]:
a seeded generator always gives the same sequence.

## Navigation

The state machine ([`crate::Survey`]) moves through:

- `AwaitingConsent`: nothing happens until the respondent agrees.
- `InProgress`: the position is a (section, comparison) couple. Moving forward past the last
  comparison of a section goes to the first comparison of the next section; moving back from
  the first comparison of a section goes to the last comparison of the previous one. Moving back
  from the very first comparison does nothing.
- `Completed`: reached when moving forward from the last comparison.

Sections without comparisons are skipped. Navigation does not require an answer: the front-end
may decide to require one before moving forward (see `requireAnswerToAdvance` below).

Answering the same comparison twice keeps only the latest answer.

## Saved sessions

After every change, the front-end saves the state as JSON:

```text
{
  "respondentId": "3b0c8a5e-...",
  "interviewId": "lq2k9x1ab3cd",
  "pairs": [ ... ],
  "responses": [ ... ],
  "currentSection": 1,
  "currentComparison": 3,
  "consentGiven": true
}
```

A saved state that cannot be read, or that is not consistent (unknown comparisons, position out
of bounds, ...), is ignored and the respondent is asked for consent again.

When the survey is completed, the responses are saved separately together with a completion
flag, so that the respondent may later leave an email address. Every response is then sent again,
one after the other, with the address attached.

## Catalog formats

### `csv`

A text file with a header line and one outlet per line, separated by commas. There is no
support for quoting. The columns `codename`, `name` and `type` are required, `pic` is optional.

```text
codename,name,type,pic
tg1,TG1,tg,https://example.org/tg1.png
radio24,Radio 24,radio,
```

Lines that do not have the same number of fields as the header are dropped. Outlets with an
unknown type, an empty codename or a codename already seen are skipped.

### `xlsx`

The same columns, in the first worksheet of an Excel workbook (or the worksheet named by
`excelWorksheetName`). All the cells must be text.

## Configuration file

All the keys are optional except for the catalog source.

```text
{
  "catalogSource": {
    "provider": "csv",
    "filePath": "media_list.csv"
  },
  "survey": {
    "sections": [ {"id": 1, "type": "tg", "name": "Telegiornali"}, ... ],
    "comparisonsPerSection": 6,
    "mainstreamOutlets": ["tg1", "tg5", ...],
    "requireAnswerToAdvance": true
  },
  "form": {
    "formUrl": "https://docs.google.com/forms/d/e/.../formResponse",
    "formFields": { "respondentId": "entry.1734835485", ... },
    "timeoutSecs": 10
  },
  "storePath": "session.json"
}
```

Relative paths are resolved against the directory of the configuration file.

## Submissions

Each answer is posted to the form as soon as it is given, without waiting for the result: a
failed submission is only logged. The fields are the respondent id, the time of sending, the
interview id, the comparison id, the two codenames, the chosen codename (or `dk`), the section
type and the email address (`NA` if none was given). A request that gets no answer within
`timeoutSecs` seconds is abandoned.

The saved session is written to a temporary file next to the store and then renamed over it, so
the store file always holds a complete session.

## Command line

```text
mbisurvey --config survey.json
mbisurvey --catalog media_list.csv --offline
mbisurvey --catalog media_list.csv --seed 42 --plan
mbisurvey --catalog media_list.csv --seed 42 --plan --reference expected_plan.json
```

`--plan` prints the generated comparisons as JSON instead of running the survey. With
`--reference`, the output is compared with a reference file and the differences are printed.

*/
